//! Change notifications
//!
//! The event shape a change feed produces: `{type, old_val?, new_val?,
//! old_offset?, new_offset?, state?}`. Offsets are present only for
//! ordered, limited feeds and refer to the array before the change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HorizonError, HorizonResult};

/// Kind of change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Remove,
    Change,
    Initial,
    Uninitial,
    State,
}

/// Synchronization state carried by `state` changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Initial results are still being delivered
    Initializing,
    /// Initial results are complete; changes are live
    Ready,
}

/// One change-feed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub kind: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<FeedState>,
}

impl Change {
    fn new(kind: ChangeType) -> Self {
        Self {
            kind,
            old_val: None,
            new_val: None,
            old_offset: None,
            new_offset: None,
            state: None,
        }
    }

    /// A document entered the result set
    pub fn add(new_val: Value, new_offset: Option<usize>) -> Self {
        Self {
            new_val: Some(new_val),
            new_offset,
            ..Self::new(ChangeType::Add)
        }
    }

    /// A document of the initial result set
    pub fn initial(new_val: Value, new_offset: Option<usize>) -> Self {
        Self {
            new_val: Some(new_val),
            new_offset,
            ..Self::new(ChangeType::Initial)
        }
    }

    /// A document left the result set
    pub fn remove(old_val: Value, old_offset: Option<usize>) -> Self {
        Self {
            old_val: Some(old_val),
            old_offset,
            ..Self::new(ChangeType::Remove)
        }
    }

    /// A document in the result set changed
    pub fn change(
        old_val: Value,
        new_val: Value,
        old_offset: Option<usize>,
        new_offset: Option<usize>,
    ) -> Self {
        Self {
            old_val: Some(old_val),
            new_val: Some(new_val),
            old_offset,
            new_offset,
            ..Self::new(ChangeType::Change)
        }
    }

    /// A synchronization marker
    pub fn state(state: FeedState) -> Self {
        Self {
            state: Some(state),
            ..Self::new(ChangeType::State)
        }
    }

    /// Parse a change notification; an unknown `type` is a protocol violation
    pub fn from_value(value: Value) -> HorizonResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| HorizonError::protocol(format!("Unrecognized change: {}", e)))
    }

    /// Every document the change exposes, old side first
    pub fn documents(&self) -> impl Iterator<Item = &Value> {
        self.old_val.iter().chain(self.new_val.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_documents_include_both_sides() {
        let change = Change::change(json!({"id": 1, "v": 0}), json!({"id": 1, "v": 1}), None, None);
        let docs: Vec<&Value> = change.documents().collect();
        assert_eq!(docs, vec![&json!({"id": 1, "v": 0}), &json!({"id": 1, "v": 1})]);

        assert_eq!(Change::state(FeedState::Ready).documents().count(), 0);
    }

    #[test]
    fn test_parse_change() {
        let change = Change::from_value(json!({
            "type": "change",
            "old_val": {"id": 1, "a": 1},
            "new_val": {"id": 1, "a": 2},
            "old_offset": 0,
            "new_offset": 2
        }))
        .unwrap();
        assert_eq!(change.kind, ChangeType::Change);
        assert_eq!(change.old_offset, Some(0));
        assert_eq!(change.new_offset, Some(2));
    }

    #[test]
    fn test_unknown_type_is_protocol_violation() {
        let err = Change::from_value(json!({"type": "upsert", "new_val": {"id": 1}})).unwrap_err();
        assert!(matches!(err, HorizonError::ProtocolViolation(_)));
    }

    #[test]
    fn test_state_serialization() {
        let value = serde_json::to_value(Change::state(FeedState::Ready)).unwrap();
        assert_eq!(value, json!({"type": "state", "state": "ready"}));
    }
}
