//! Write strategies
//!
//! Each write kind supplies the three steps the retry loop drives:
//! `pre_validate` reads current state, `validate_row` decides legality and
//! plans the conditional write, `commit` performs it. Compare-and-swap on
//! the version field is the only concurrency control.

use futures_util::future::{join_all, BoxFuture};
use serde_json::Value;
use uuid::Uuid;

use crate::collections::Collection;
use crate::errors::{HorizonError, HorizonResult};
use crate::permissions::PermissionValidator;
use crate::store::document::{
    id_of, id_only, merge, next_version, require_id, summary, version_of, with_version,
    without_version,
};
use crate::store::{Expect, ReplaceOutcome, ID_FIELD, VERSION_FIELD};

/// Outcome of one row: its summary, or why it failed
pub type RowResult = HorizonResult<Value>;

/// What `validate_row` decided for a row
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Conditional replace of `id` (`new = None` deletes)
    Write {
        id: Value,
        expect: Expect,
        new: Option<Value>,
    },
    /// The row already has its final state; report this value
    Satisfied(Value),
}

/// The operation-specific half of the write protocol
pub trait WriteStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Normalize a client row once, before any store access
    fn prepare(&self, row: Value) -> HorizonResult<Value>;

    /// Current document of each row, without mutating anything
    fn pre_validate<'a>(
        &'a self,
        collection: &'a Collection,
        rows: &'a [Value],
    ) -> BoxFuture<'a, HorizonResult<Vec<Option<Value>>>>;

    /// Authorization and existence checks; plans the write
    fn validate_row(
        &self,
        validator: &dyn PermissionValidator,
        collection: &str,
        row: &Value,
        current: Option<&Value>,
    ) -> HorizonResult<Plan>;

    /// Perform planned writes; one result per plan, in order
    fn commit<'a>(
        &'a self,
        collection: &'a Collection,
        plans: Vec<Plan>,
    ) -> BoxFuture<'a, HorizonResult<Vec<RowResult>>>;
}

/// The built-in write kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// Create or overwrite
    Store,
    /// Create; fails if the document exists
    Insert,
    /// Create, or merge into the existing document
    Upsert,
    /// Merge into an existing document
    Update,
    /// Overwrite an existing document
    Replace,
    /// Delete; an absent document counts as removed
    Remove,
}

impl WriteKind {
    pub const ALL: [WriteKind; 6] = [
        WriteKind::Store,
        WriteKind::Insert,
        WriteKind::Upsert,
        WriteKind::Update,
        WriteKind::Replace,
        WriteKind::Remove,
    ];

    /// Whether a missing `id` is generated instead of rejected
    pub fn generates_ids(&self) -> bool {
        matches!(self, WriteKind::Store | WriteKind::Insert | WriteKind::Upsert)
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The client's expected version, if the row carries one
pub fn client_version(row: &Value) -> HorizonResult<Option<u64>> {
    match row.get(VERSION_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            HorizonError::validation(format!("\"{}\" must be a non-negative integer", VERSION_FIELD))
        }),
    }
}

fn expect_for(current: Option<&Value>) -> Expect {
    match current {
        None => Expect::Absent,
        Some(doc) => Expect::Version(version_of(doc)),
    }
}

impl WriteStrategy for WriteKind {
    fn name(&self) -> &'static str {
        match self {
            WriteKind::Store => "store",
            WriteKind::Insert => "insert",
            WriteKind::Upsert => "upsert",
            WriteKind::Update => "update",
            WriteKind::Replace => "replace",
            WriteKind::Remove => "remove",
        }
    }

    fn prepare(&self, mut row: Value) -> HorizonResult<Value> {
        let Some(fields) = row.as_object_mut() else {
            return Err(HorizonError::validation(format!(
                "Rows passed to \"{}\" must be objects",
                self.name()
            )));
        };
        if self.generates_ids() && fields.get(ID_FIELD).map_or(true, Value::is_null) {
            fields.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        require_id(&row, self.name())?;
        client_version(&row)?;
        Ok(row)
    }

    fn pre_validate<'a>(
        &'a self,
        collection: &'a Collection,
        rows: &'a [Value],
    ) -> BoxFuture<'a, HorizonResult<Vec<Option<Value>>>> {
        Box::pin(async move {
            let ids: Vec<Value> = rows
                .iter()
                .map(|row| id_of(row).cloned().unwrap_or(Value::Null))
                .collect();
            collection.get_many(&ids).await
        })
    }

    fn validate_row(
        &self,
        validator: &dyn PermissionValidator,
        collection: &str,
        row: &Value,
        current: Option<&Value>,
    ) -> HorizonResult<Plan> {
        let id = require_id(row, self.name())?.clone();

        match (self, current) {
            (WriteKind::Insert, Some(_)) => return Err(HorizonError::DocumentExists(id_text(&id))),
            (WriteKind::Update | WriteKind::Replace, None) => {
                return Err(HorizonError::MissingDocument(id_text(&id)))
            }
            (WriteKind::Remove, None) => return Ok(Plan::Satisfied(id_only(&id))),
            _ => {}
        }

        if *self != WriteKind::Insert {
            if let Some(expected) = client_version(row)? {
                if current.and_then(version_of) != Some(expected) {
                    return Err(HorizonError::InvalidatedDocument(id_text(&id)));
                }
            }
        }

        let version = next_version(current);
        let new = match (self, current) {
            (WriteKind::Remove, _) => None,
            (WriteKind::Upsert | WriteKind::Update, Some(doc)) => {
                Some(with_version(merge(doc, &without_version(row.clone())), version))
            }
            _ => Some(with_version(without_version(row.clone()), version)),
        };

        if !validator.can_write(collection, new.as_ref(), current) {
            return Err(HorizonError::Unauthorized(format!(
                "\"{}\" of {} in \"{}\"",
                self.name(),
                id_text(&id),
                collection
            )));
        }

        Ok(Plan::Write {
            id,
            expect: expect_for(current),
            new,
        })
    }

    fn commit<'a>(
        &'a self,
        collection: &'a Collection,
        plans: Vec<Plan>,
    ) -> BoxFuture<'a, HorizonResult<Vec<RowResult>>> {
        Box::pin(async move {
            let writes = plans
                .into_iter()
                .map(|plan| commit_one(*self, collection, plan));
            join_all(writes).await.into_iter().collect()
        })
    }
}

async fn commit_one(kind: WriteKind, collection: &Collection, plan: Plan) -> HorizonResult<RowResult> {
    let (id, expect, new) = match plan {
        Plan::Satisfied(value) => return Ok(Ok(value)),
        Plan::Write { id, expect, new } => (id, expect, new),
    };
    let outcome = collection.replace(&id, expect, new).await?;
    Ok(match outcome {
        ReplaceOutcome::Written { new: Some(doc), .. } => Ok(summary(&doc)),
        ReplaceOutcome::Written { old, new: None } => {
            Ok(old.as_ref().map_or_else(|| id_only(&id), summary))
        }
        // Vanished after pre-validation
        ReplaceOutcome::Missing if kind == WriteKind::Remove => Ok(id_only(&id)),
        ReplaceOutcome::Missing => Err(HorizonError::MissingDocument(id_text(&id))),
        ReplaceOutcome::Conflict { .. } => Err(HorizonError::InvalidatedDocument(id_text(&id))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permissive;
    use serde_json::json;

    struct DenyAll;

    impl PermissionValidator for DenyAll {
        fn can_read(&self, _: &str, _: &Value) -> bool {
            false
        }

        fn can_write(&self, _: &str, _: Option<&Value>, _: Option<&Value>) -> bool {
            false
        }
    }

    #[test]
    fn test_prepare_generates_ids() {
        let row = WriteKind::Insert.prepare(json!({"x": 1})).unwrap();
        assert!(row["id"].as_str().is_some_and(|id| !id.is_empty()));

        let err = WriteKind::Update.prepare(json!({"x": 1})).unwrap_err();
        assert!(matches!(err, HorizonError::Validation(_)));

        let err = WriteKind::Store.prepare(json!([1, 2])).unwrap_err();
        assert!(matches!(err, HorizonError::Validation(_)));

        let err = WriteKind::Store.prepare(json!({"id": 1, "$hz_v$": "two"})).unwrap_err();
        assert!(matches!(err, HorizonError::Validation(_)));
    }

    #[test]
    fn test_existence_preconditions() {
        let current = json!({"id": 1, "$hz_v$": 0});
        let row = json!({"id": 1});

        let err = WriteKind::Insert
            .validate_row(&Permissive, "t", &row, Some(&current))
            .unwrap_err();
        assert!(matches!(err, HorizonError::DocumentExists(_)));

        for kind in [WriteKind::Update, WriteKind::Replace] {
            let err = kind.validate_row(&Permissive, "t", &row, None).unwrap_err();
            assert!(matches!(err, HorizonError::MissingDocument(_)));
        }

        let plan = WriteKind::Remove.validate_row(&Permissive, "t", &row, None).unwrap();
        assert_eq!(plan, Plan::Satisfied(json!({"id": 1})));
    }

    #[test]
    fn test_update_merges_and_bumps_version() {
        let current = json!({"id": 1, "a": 1, "nested": {"x": 1}, "$hz_v$": 3});
        let row = json!({"id": 1, "nested": {"y": 2}});
        let plan = WriteKind::Update
            .validate_row(&Permissive, "t", &row, Some(&current))
            .unwrap();
        assert_eq!(
            plan,
            Plan::Write {
                id: json!(1),
                expect: Expect::Version(Some(3)),
                new: Some(json!({"id": 1, "a": 1, "nested": {"x": 1, "y": 2}, "$hz_v$": 4})),
            }
        );
    }

    #[test]
    fn test_first_write_is_version_zero() {
        let plan = WriteKind::Store
            .validate_row(&Permissive, "t", &json!({"id": "a"}), None)
            .unwrap();
        let Plan::Write { expect, new, .. } = plan else {
            panic!("expected a write");
        };
        assert_eq!(expect, Expect::Absent);
        assert_eq!(new, Some(json!({"id": "a", "$hz_v$": 0})));
    }

    #[test]
    fn test_stale_client_version() {
        let current = json!({"id": 1, "$hz_v$": 5});
        let row = json!({"id": 1, "$hz_v$": 4, "a": 2});
        let err = WriteKind::Replace
            .validate_row(&Permissive, "t", &row, Some(&current))
            .unwrap_err();
        assert!(matches!(err, HorizonError::InvalidatedDocument(_)));
    }

    #[test]
    fn test_permission_denied() {
        let err = WriteKind::Store
            .validate_row(&DenyAll, "t", &json!({"id": 1}), None)
            .unwrap_err();
        assert!(matches!(err, HorizonError::Unauthorized(_)));
    }
}
