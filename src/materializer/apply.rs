//! Applying change notifications to an array
//!
//! Offsets refer to the array before the change. A change that cannot be
//! applied exactly is an error; nothing is silently dropped.

use serde_json::Value;

use crate::errors::{HorizonError, HorizonResult};
use crate::store::document::id_of;
use crate::store::{Change, ChangeType};

fn require<'a>(val: Option<&'a Value>, field: &str, kind: ChangeType) -> HorizonResult<&'a Value> {
    val.ok_or_else(|| {
        HorizonError::protocol(format!("\"{:?}\" change without {}", kind, field).to_lowercase())
    })
}

/// `len` is the row count at insertion time
fn check_insert(len: usize, offset: usize) -> HorizonResult<()> {
    if offset > len {
        return Err(HorizonError::protocol(format!(
            "Offset {} is past the end of {} rows",
            offset, len
        )));
    }
    Ok(())
}

fn check_remove(rows: &[Value], offset: usize) -> HorizonResult<()> {
    if offset >= rows.len() {
        return Err(HorizonError::protocol(format!(
            "No row at offset {} of {} rows",
            offset,
            rows.len()
        )));
    }
    Ok(())
}

/// Index of the row with the same `id` as `doc`
fn locate(rows: &[Value], doc: &Value) -> HorizonResult<usize> {
    let id = id_of(doc).ok_or_else(|| HorizonError::protocol("Change row has no id"))?;
    rows.iter()
        .position(|row| id_of(row) == Some(id))
        .ok_or_else(|| HorizonError::protocol(format!("No row with id {}", id)))
}

/// Apply one change to `rows` in place
pub fn apply_change(rows: &mut Vec<Value>, change: &Change) -> HorizonResult<()> {
    match change.kind {
        ChangeType::Add | ChangeType::Initial => {
            let new_val = require(change.new_val.as_ref(), "new_val", change.kind)?.clone();
            match change.new_offset {
                Some(offset) => {
                    check_insert(rows.len(), offset)?;
                    rows.insert(offset, new_val);
                }
                None => rows.push(new_val),
            }
        }
        ChangeType::Remove | ChangeType::Uninitial => {
            let index = match change.old_offset {
                Some(offset) => {
                    check_remove(rows, offset)?;
                    offset
                }
                None => locate(rows, require(change.old_val.as_ref(), "old_val", change.kind)?)?,
            };
            rows.remove(index);
        }
        ChangeType::Change => {
            let new_val = require(change.new_val.as_ref(), "new_val", change.kind)?.clone();
            let by_id = change.old_val.as_ref().unwrap_or(&new_val);
            match (change.old_offset, change.new_offset) {
                (Some(old), Some(new)) => {
                    check_remove(rows, old)?;
                    check_insert(rows.len() - 1, new)?;
                    rows.remove(old);
                    rows.insert(new, new_val);
                }
                (Some(old), None) => {
                    check_remove(rows, old)?;
                    rows[old] = new_val;
                }
                (None, Some(new)) => {
                    let old = locate(rows, by_id)?;
                    check_insert(rows.len() - 1, new)?;
                    rows.remove(old);
                    rows.insert(new, new_val);
                }
                (None, None) => {
                    let index = locate(rows, by_id)?;
                    rows[index] = new_val;
                }
            }
        }
        ChangeType::State => {}
    }
    Ok(())
}

/// Parse a raw change notification and apply it
pub fn apply_change_value(rows: &mut Vec<Value>, change: Value) -> HorizonResult<()> {
    apply_change(rows, &Change::from_value(change)?)
}
