//! # Retry Loop
//!
//! `validate → commit → (done | retry subset | timeout)`:
//!
//! 1. Snapshot current documents of the pending rows
//! 2. Validate each row; failures are recorded per row
//! 3. Commit the rest with compare-and-swap on the version field
//! 4. Rows that lost a race are retried while the deadline allows;
//!    committed and permanently failed rows are never redone
//!
//! A row carrying a client version is never retried: a lost race means
//! the client's copy is stale.

use serde_json::Value;
use tokio::time::Instant;

use super::strategy::{Plan, RowResult, WriteStrategy};
use crate::collections::Collection;
use crate::errors::{HorizonError, HorizonResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::permissions::PermissionValidator;
use crate::store::document::version_of;

/// Where a batch write happens
pub struct WriteTarget<'a> {
    pub collection: &'a Collection,
    pub validator: &'a dyn PermissionValidator,
    pub metrics: &'a MetricsRegistry,
}

/// Run the write protocol for `rows`; one result per row, in order.
/// Only store failures abort the batch.
pub async fn retry_loop(
    strategy: &dyn WriteStrategy,
    target: &WriteTarget<'_>,
    rows: Vec<Value>,
    deadline: Instant,
) -> HorizonResult<Vec<RowResult>> {
    let mut results: Vec<Option<RowResult>> = Vec::with_capacity(rows.len());
    let mut prepared: Vec<Value> = Vec::with_capacity(rows.len());
    let mut pending: Vec<usize> = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        match strategy.prepare(row) {
            Ok(row) => {
                prepared.push(row);
                results.push(None);
                pending.push(i);
            }
            Err(err) => {
                prepared.push(Value::Null);
                results.push(Some(Err(err)));
            }
        }
    }

    let name = target.collection.name();
    let mut attempt = 0u32;
    while !pending.is_empty() {
        if attempt > 0 && Instant::now() >= deadline {
            log_event_with_fields(
                Event::WriteTimeout,
                &[
                    ("collection", name),
                    ("method", strategy.name()),
                    ("rows", &pending.len().to_string()),
                ],
            );
            target.metrics.add_write_timeouts(pending.len() as u64);
            for &i in &pending {
                results[i] = Some(Err(HorizonError::Timeout(format!(
                    "Gave up after {} attempts",
                    attempt
                ))));
            }
            break;
        }
        attempt += 1;

        let batch: Vec<Value> = pending.iter().map(|&i| prepared[i].clone()).collect();
        let current = strategy.pre_validate(target.collection, &batch).await?;

        let mut plans = Vec::new();
        let mut planned = Vec::new();
        for ((&i, row), current) in pending.iter().zip(&batch).zip(current) {
            match strategy.validate_row(target.validator, name, row, current.as_ref()) {
                Ok(Plan::Satisfied(value)) => results[i] = Some(Ok(value)),
                Ok(plan) => {
                    plans.push(plan);
                    planned.push(i);
                }
                Err(err) => results[i] = Some(Err(err)),
            }
        }

        let committed = strategy.commit(target.collection, plans).await?;
        let mut retry = Vec::new();
        for (i, outcome) in planned.into_iter().zip(committed) {
            match outcome {
                Err(HorizonError::InvalidatedDocument(_)) if version_of(&prepared[i]).is_none() => {
                    retry.push(i)
                }
                other => results[i] = Some(other),
            }
        }

        if !retry.is_empty() {
            target.metrics.increment_write_retries();
            log_event_with_fields(
                Event::WriteRetry,
                &[
                    ("collection", name),
                    ("method", strategy.name()),
                    ("rows", &retry.len().to_string()),
                    ("attempt", &attempt.to_string()),
                ],
            );
            // Let the competing writers finish
            tokio::task::yield_now().await;
        }
        pending = retry;
    }

    let results: Vec<RowResult> = results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(HorizonError::internal("Row left unresolved"))))
        .collect();
    let committed = results.iter().filter(|r| r.is_ok()).count() as u64;
    target.metrics.add_rows_committed(committed);
    target.metrics.add_rows_failed(results.len() as u64 - committed);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::permissions::Permissive;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::writes::WriteKind;

    fn setup() -> (Arc<MemoryStore>, Collection) {
        let store = Arc::new(MemoryStore::with_tables(&["t"]));
        let collection = Collection::new("t", "t", Arc::clone(&store) as Arc<dyn DocumentStore>);
        (store, collection)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_partial_success() {
        let (store, collection) = setup();
        store.load("t", vec![json!({"id": 1})]).unwrap();
        let metrics = MetricsRegistry::new();
        let target = WriteTarget {
            collection: &collection,
            validator: &Permissive,
            metrics: &metrics,
        };

        let results = retry_loop(
            &WriteKind::Insert,
            &target,
            vec![json!({"id": 1}), json!({"id": 2}), json!("not a row")],
            deadline(),
        )
        .await
        .unwrap();

        assert!(matches!(results[0], Err(HorizonError::DocumentExists(_))));
        assert_eq!(results[1], Ok(json!({"id": 2, "$hz_v$": 0})));
        assert!(matches!(results[2], Err(HorizonError::Validation(_))));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rows_committed, 1);
        assert_eq!(snapshot.rows_failed, 2);
    }

    #[tokio::test]
    async fn test_remove_missing_is_satisfied() {
        let (_store, collection) = setup();
        let metrics = MetricsRegistry::new();
        let target = WriteTarget {
            collection: &collection,
            validator: &Permissive,
            metrics: &metrics,
        };
        let results = retry_loop(&WriteKind::Remove, &target, vec![json!({"id": 9})], deadline())
            .await
            .unwrap();
        assert_eq!(results, vec![Ok(json!({"id": 9}))]);
    }
}
