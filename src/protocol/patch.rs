//! Patch vocabulary
//!
//! JSON-Patch-like operations on the client's virtual value
//! `{type, synced, val}`. Array paths address `/val/<n>`; the index `-`
//! means "append" for `add` and "the element with the same `id` as
//! `value`" for `remove`/`replace`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Path of the whole virtual value
pub const ROOT: &str = "";
/// Path of the synced flag
pub const SYNCED: &str = "/synced";
/// Path of the value body
pub const VAL: &str = "/val";
/// Path addressing "append" or "by id" inside the array body
pub const VAL_ANY: &str = "/val/-";

/// Patch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// Shape of the virtual value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// A single document or null (`find`)
    Value,
    /// An array of documents
    Set,
}

/// One incremental change to a client-visible value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    /// `add` at `path`
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    /// `remove` at `path`
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    /// `replace` at `path`
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Reset the whole virtual value
    pub fn reset(value_type: ValueType, synced: bool, val: Value) -> Self {
        Self::replace(
            ROOT,
            json!({ "type": value_type, "synced": synced, "val": val }),
        )
    }

    /// Initial value of a read: unsynced, empty
    pub fn initial(value_type: ValueType) -> Self {
        let val = match value_type {
            ValueType::Value => Value::Null,
            ValueType::Set => Value::Array(Vec::new()),
        };
        Self::reset(value_type, false, val)
    }

    /// Set the synced flag
    pub fn synced(synced: bool) -> Self {
        Self::replace(SYNCED, Value::Bool(synced))
    }

    /// Array index addressed by this patch's path: `Some(Some(n))` for
    /// `/val/<n>`, `Some(None)` for `/val/-`, `None` otherwise
    pub fn array_index(&self) -> Option<Option<usize>> {
        let rest = self.path.strip_prefix("/val/")?;
        if rest == "-" {
            Some(None)
        } else {
            rest.parse().ok().map(Some)
        }
    }
}

/// Path of array element `n`
pub fn val_index(n: usize) -> String {
    format!("/val/{}", n)
}
