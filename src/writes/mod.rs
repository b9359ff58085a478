//! # Writes Module
//!
//! The write coordinator shared by `store`, `insert`, `upsert`, `update`,
//! `replace` and `remove`. Partial success is normal: every row gets its
//! own result.

mod retry;
mod strategy;

pub use retry::{retry_loop, WriteTarget};
pub use strategy::{client_version, Plan, RowResult, WriteKind, WriteStrategy};

use serde_json::{json, Value};

use crate::protocol::{Patch, ValueType};

/// Render one row result as `{id, $hz_v$}` or `{error, error_code}`
pub fn render_row(result: &RowResult) -> Value {
    match result {
        Ok(summary) => summary.clone(),
        Err(err) => json!({ "error": err.to_string(), "error_code": err.code() }),
    }
}

/// The single patch a write request produces
pub fn render_results(results: &[RowResult]) -> Patch {
    let rows: Vec<Value> = results.iter().map(render_row).collect();
    Patch::reset(ValueType::Value, true, Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HorizonError;

    #[test]
    fn test_render_results() {
        let patch = render_results(&[
            Ok(json!({"id": 1, "$hz_v$": 0})),
            Err(HorizonError::MissingDocument("2".into())),
        ]);
        assert_eq!(patch.path, "");
        assert_eq!(
            patch.value,
            Some(json!({
                "type": "value",
                "synced": true,
                "val": [
                    {"id": 1, "$hz_v$": 0},
                    {"error": "The document was missing.", "error_code": "MISSING_DOCUMENT"}
                ]
            }))
        );
    }
}
