//! Patch streams and materialized views
//!
//! The server turns store changes into patches on the client's virtual
//! value `{type, synced, val}`; `Materialized` folds those patches back
//! into a value by way of `apply_change`.

use serde_json::Value;

use super::apply::apply_change;
use crate::errors::{HorizonError, HorizonResult};
use crate::protocol::patch::{val_index, SYNCED, VAL, VAL_ANY};
use crate::protocol::{Patch, PatchOp, ValueType};
use crate::store::{Change, ChangeType, FeedState};

/// Patches describing `change` for a value of `value_type`
pub fn change_to_patches(change: &Change, value_type: ValueType) -> Vec<Patch> {
    if change.kind == ChangeType::State {
        return match change.state {
            Some(state) => vec![Patch::synced(state == FeedState::Ready)],
            None => Vec::new(),
        };
    }

    if value_type == ValueType::Value {
        let val = match change.kind {
            ChangeType::Remove | ChangeType::Uninitial => Value::Null,
            _ => change.new_val.clone().unwrap_or(Value::Null),
        };
        return vec![Patch::replace(VAL, val)];
    }

    let new_val = || change.new_val.clone().unwrap_or(Value::Null);
    let old_val = || change.old_val.clone().unwrap_or(Value::Null);
    match change.kind {
        ChangeType::Add | ChangeType::Initial => {
            let path = change.new_offset.map_or_else(|| VAL_ANY.to_string(), val_index);
            vec![Patch::add(path, new_val())]
        }
        ChangeType::Remove | ChangeType::Uninitial => match change.old_offset {
            Some(offset) => vec![Patch::remove(val_index(offset))],
            None => vec![Patch {
                op: PatchOp::Remove,
                path: VAL_ANY.to_string(),
                value: Some(old_val()),
            }],
        },
        ChangeType::Change => match (change.old_offset, change.new_offset) {
            (Some(old), Some(new)) => vec![
                Patch::remove(val_index(old)),
                Patch::add(val_index(new), new_val()),
            ],
            (Some(old), None) => vec![Patch::replace(val_index(old), new_val())],
            (None, Some(new)) => vec![
                Patch {
                    op: PatchOp::Remove,
                    path: VAL_ANY.to_string(),
                    value: Some(old_val()),
                },
                Patch::add(val_index(new), new_val()),
            ],
            (None, None) => vec![Patch::replace(VAL_ANY, new_val())],
        },
        ChangeType::State => Vec::new(),
    }
}

/// A client-side value rebuilt from a patch stream
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    value_type: ValueType,
    synced: bool,
    single: Value,
    rows: Vec<Value>,
}

impl Default for Materialized {
    fn default() -> Self {
        Self::new(ValueType::Set)
    }
}

impl Materialized {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            synced: false,
            single: Value::Null,
            rows: Vec::new(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Whether the initial results were fully delivered
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Rows of a set value
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// The `val` field: a document or null for `value`, an array for `set`
    pub fn val(&self) -> Value {
        match self.value_type {
            ValueType::Value => self.single.clone(),
            ValueType::Set => Value::Array(self.rows.clone()),
        }
    }

    pub fn apply_patches<'a>(&mut self, patches: impl IntoIterator<Item = &'a Patch>) -> HorizonResult<()> {
        for patch in patches {
            self.apply_patch(patch)?;
        }
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &Patch) -> HorizonResult<()> {
        match (patch.op, patch.path.as_str()) {
            (PatchOp::Replace, "") => self.reset(patch.value.as_ref()),
            (PatchOp::Replace, SYNCED) => {
                self.synced = patch
                    .value
                    .as_ref()
                    .and_then(Value::as_bool)
                    .ok_or_else(|| HorizonError::protocol("\"/synced\" must be a boolean"))?;
                Ok(())
            }
            (PatchOp::Replace, VAL) => {
                let value = patch.value.clone().unwrap_or(Value::Null);
                match (self.value_type, value) {
                    (ValueType::Set, Value::Array(rows)) => self.rows = rows,
                    (ValueType::Set, _) => {
                        return Err(HorizonError::protocol("A set value must be an array"))
                    }
                    (ValueType::Value, value) => self.single = value,
                }
                Ok(())
            }
            _ => {
                let change = self.patch_to_change(patch)?;
                apply_change(&mut self.rows, &change)
            }
        }
    }

    fn reset(&mut self, value: Option<&Value>) -> HorizonResult<()> {
        let value = value.ok_or_else(|| HorizonError::protocol("Reset without a value"))?;
        let value_type: ValueType = value
            .get("type")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| HorizonError::protocol(format!("Invalid value type: {}", e)))?
            .unwrap_or(self.value_type);
        *self = Self::new(value_type);
        self.synced = value.get("synced").and_then(Value::as_bool).unwrap_or(false);
        match (value_type, value.get("val").cloned().unwrap_or(Value::Null)) {
            (ValueType::Set, Value::Array(rows)) => self.rows = rows,
            (ValueType::Set, Value::Null) => {}
            (ValueType::Set, _) => return Err(HorizonError::protocol("A set value must be an array")),
            (ValueType::Value, single) => self.single = single,
        }
        Ok(())
    }

    /// The array change an element patch stands for
    fn patch_to_change(&self, patch: &Patch) -> HorizonResult<Change> {
        if self.value_type != ValueType::Set {
            return Err(HorizonError::protocol(format!(
                "Element patch \"{}\" on a single value",
                patch.path
            )));
        }
        let index = patch
            .array_index()
            .ok_or_else(|| HorizonError::protocol(format!("Unknown patch path \"{}\"", patch.path)))?;
        let value = || {
            patch
                .value
                .clone()
                .ok_or_else(|| HorizonError::protocol(format!("\"{:?}\" patch without a value", patch.op)))
        };

        Ok(match (patch.op, index) {
            (PatchOp::Add, offset) => Change::add(value()?, offset),
            (PatchOp::Remove, Some(offset)) => {
                let old = self.rows.get(offset).cloned().unwrap_or(Value::Null);
                Change::remove(old, Some(offset))
            }
            (PatchOp::Remove, None) => Change::remove(value()?, None),
            (PatchOp::Replace, Some(offset)) => {
                let new = value()?;
                Change::change(new.clone(), new, Some(offset), None)
            }
            (PatchOp::Replace, None) => {
                let new = value()?;
                Change::change(new.clone(), new, None, None)
            }
        })
    }
}
