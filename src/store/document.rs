//! Document helpers
//!
//! Documents are JSON objects with a required `id` and the reserved
//! version field. The core never caches document bodies across requests.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::errors::{HorizonError, HorizonResult};

/// Primary key field
pub const ID_FIELD: &str = "id";

/// Reserved optimistic-concurrency version field
pub const VERSION_FIELD: &str = "$hz_v$";

/// The document's `id`, if any
pub fn id_of(doc: &Value) -> Option<&Value> {
    doc.get(ID_FIELD).filter(|id| !id.is_null())
}

/// The document's `id`, or a validation error naming the operation
pub fn require_id<'a>(doc: &'a Value, op: &str) -> HorizonResult<&'a Value> {
    id_of(doc).ok_or_else(|| {
        HorizonError::validation(format!("\"id\" must be specified for \"{}\"", op))
    })
}

/// The document's version, if it has been written before
pub fn version_of(doc: &Value) -> Option<u64> {
    doc.get(VERSION_FIELD).and_then(Value::as_u64)
}

/// Version the next successful write assigns
pub fn next_version(current: Option<&Value>) -> u64 {
    current.and_then(version_of).map_or(0, |v| v + 1)
}

/// Copy of `doc` with its version field set
pub fn with_version(mut doc: Value, version: u64) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(VERSION_FIELD.to_string(), Value::from(version));
    }
    doc
}

/// Copy of `doc` without the version field
pub fn without_version(mut doc: Value) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        obj.remove(VERSION_FIELD);
    }
    doc
}

/// `{id}` stand-in for a document that does not exist
pub fn id_only(id: &Value) -> Value {
    let mut obj = Map::new();
    obj.insert(ID_FIELD.to_string(), id.clone());
    Value::Object(obj)
}

/// `{id, $hz_v$}` summary of a committed document
pub fn summary(doc: &Value) -> Value {
    let mut obj = Map::new();
    if let Some(id) = id_of(doc) {
        obj.insert(ID_FIELD.to_string(), id.clone());
    }
    if let Some(version) = version_of(doc) {
        obj.insert(VERSION_FIELD.to_string(), Value::from(version));
    }
    Value::Object(obj)
}

/// Stable map key for an id value
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => format!("s:{}", s),
        other => format!("j:{}", other),
    }
}

/// Deep merge of `patch` into `base`; nested objects merge, everything
/// else is overwritten
pub fn merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => {
            let mut merged = b.clone();
            for (key, value) in p {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, patch) => patch.clone(),
    }
}

fn type_rank(v: &Value) -> u8 {
    // Types order by name: ARRAY < BOOL < NULL < NUMBER < OBJECT < STRING
    match v {
        Value::Array(_) => 0,
        Value::Bool(_) => 1,
        Value::Null => 2,
        Value::Number(_) => 3,
        Value::Object(_) => 4,
        Value::String(_) => 5,
    }
}

/// Total order over JSON values
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|l, r| l.0.cmp(r.0));
            ys.sort_by(|l, r| l.0.cmp(r.0));
            for ((lk, lv), (rk, rv)) in xs.iter().zip(ys.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(None), 0);
        assert_eq!(next_version(Some(&json!({"id": 1}))), 0);
        assert_eq!(next_version(Some(&json!({"id": 1, "$hz_v$": 4}))), 5);
    }

    #[test]
    fn test_merge_is_deep() {
        let base = json!({"id": 1, "profile": {"name": "a", "age": 3}, "tags": [1]});
        let patch = json!({"profile": {"age": 4}, "tags": [2]});
        assert_eq!(
            merge(&base, &patch),
            json!({"id": 1, "profile": {"name": "a", "age": 4}, "tags": [2]})
        );
    }

    #[test]
    fn test_summary_and_id_only() {
        let doc = json!({"id": "a", "$hz_v$": 2, "body": "x"});
        assert_eq!(summary(&doc), json!({"id": "a", "$hz_v$": 2}));
        assert_eq!(id_only(&json!(7)), json!({"id": 7}));
    }

    #[test]
    fn test_require_id() {
        assert!(require_id(&json!({"x": 1}), "update").is_err());
        assert!(require_id(&json!({"id": null}), "update").is_err());
        assert_eq!(require_id(&json!({"id": 3}), "update").unwrap(), &json!(3));
    }

    #[test]
    fn test_id_keys_distinguish_types() {
        assert_ne!(id_key(&json!("1")), id_key(&json!(1)));
        assert_eq!(id_key(&json!("a")), id_key(&json!("a")));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 2])), Ordering::Equal);
        assert_eq!(compare_values(&json!("z"), &json!(100)), Ordering::Greater);
    }
}
