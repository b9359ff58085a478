//! Write Coordinator Tests
//!
//! Optimistic writes against a shared store:
//! - Lost races are retried without losing either update
//! - Persistent contention ends in a per-row timeout
//! - Stale client versions fail permanently
//! - Per-operation existence semantics

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon::config::PermissionsConfig;
use horizon::permissions::{PermissionRule, RulePolicy};
use horizon::protocol::{ClientContext, RequestOptions};
use horizon::reliable::Reliable;
use horizon::store::{
    ChangeCursor, DocumentStore, Expect, MemoryStore, QuerySpec, ReplaceOutcome,
};
use horizon::{HorizonConfig, HorizonResult};
use serde_json::{json, Value};

use common::{error_code, write_results, Engine};

/// Store that lets a competing writer bump the target document right
/// before each of the first `races` conditional replaces
struct RacingStore {
    inner: MemoryStore,
    races: AtomicUsize,
    replaces: AtomicUsize,
}

impl RacingStore {
    fn new(races: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_tables(&["docs"]),
            races: AtomicUsize::new(races),
            replaces: AtomicUsize::new(0),
        })
    }

    fn take_race(&self) -> bool {
        self.races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DocumentStore for RacingStore {
    fn readiness(&self) -> Arc<Reliable<()>> {
        self.inner.readiness()
    }

    fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<()>> {
        self.inner.ensure_table(table)
    }

    fn has_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<bool>> {
        self.inner.has_table(table)
    }

    fn get<'a>(&'a self, table: &'a str, id: &'a Value) -> BoxFuture<'a, HorizonResult<Option<Value>>> {
        self.inner.get(table, id)
    }

    fn replace<'a>(
        &'a self,
        table: &'a str,
        id: &'a Value,
        expect: Expect,
        new: Option<Value>,
    ) -> BoxFuture<'a, HorizonResult<ReplaceOutcome>> {
        Box::pin(async move {
            let n = self.replaces.fetch_add(1, Ordering::SeqCst);
            if self.take_race() {
                if let Some(mut doc) = self.inner.get(table, id).await? {
                    doc["racer"] = json!(n);
                    self.inner.load(table, vec![doc])?;
                }
            }
            self.inner.replace(table, id, expect, new).await
        })
    }

    fn query<'a>(&'a self, table: &'a str, spec: &'a QuerySpec) -> BoxFuture<'a, HorizonResult<Vec<Value>>> {
        self.inner.query(table, spec)
    }

    fn changes<'a>(&'a self, table: &'a str, spec: &'a QuerySpec) -> BoxFuture<'a, HorizonResult<ChangeCursor>> {
        self.inner.changes(table, spec)
    }
}

fn write(method: &str, rows: Vec<Value>) -> RequestOptions {
    RequestOptions::new()
        .with("collection", vec![json!("docs")])
        .with(method, rows)
}

// =============================================================================
// Contention
// =============================================================================

/// A row that loses a race is re-validated and keeps both updates.
#[tokio::test]
async fn test_lost_race_is_retried() {
    let store = RacingStore::new(1);
    store.inner.load("docs", vec![json!({"id": "x", "n": 0})]).unwrap();
    let engine = Engine::new(store.clone(), HorizonConfig::permissive());

    let responses = engine.run(write("update", vec![json!({"id": "x", "mine": true})])).await;

    assert_eq!(write_results(&responses), vec![json!({"id": "x", "$hz_v$": 2})]);
    let doc = store.inner.get("docs", &json!("x")).await.unwrap().unwrap();
    assert_eq!(doc["mine"], json!(true));
    assert_eq!(doc["racer"], json!(0));
    assert_eq!(engine.metrics.snapshot().write_retries, 1);
}

/// Concurrent updates of one document both land.
#[tokio::test]
async fn test_concurrent_updates_do_not_lose_writes() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    store.load("docs", vec![json!({"id": 1})]).unwrap();
    let engine = Engine::new(store.clone(), HorizonConfig::permissive());

    let (a, b) = tokio::join!(
        engine.run(write("update", vec![json!({"id": 1, "a": 1})])),
        engine.run(write("update", vec![json!({"id": 1, "b": 2})])),
    );
    assert!(write_results(&a)[0].get("error").is_none());
    assert!(write_results(&b)[0].get("error").is_none());

    let doc = store.get("docs", &json!(1)).await.unwrap().unwrap();
    assert_eq!(doc["a"], json!(1));
    assert_eq!(doc["b"], json!(2));
    assert_eq!(doc["$hz_v$"], json!(2));
}

/// Rows still contended at the deadline fail with a timeout.
#[tokio::test]
async fn test_persistent_contention_times_out() {
    let store = RacingStore::new(usize::MAX);
    store.inner.load("docs", vec![json!({"id": "hot"})]).unwrap();
    let engine = Engine::new(store.clone(), HorizonConfig::permissive());

    let responses = engine
        .run(
            write("replace", vec![json!({"id": "hot", "v": 1})])
                .with("timeout", vec![json!(30)]),
        )
        .await;

    let results = write_results(&responses);
    assert_eq!(results[0]["error_code"], json!("TIMEOUT"));
    assert!(store.replaces.load(Ordering::SeqCst) >= 1);

    let metrics = engine.metrics.snapshot();
    assert_eq!(metrics.write_timeouts, 1);
    assert!(metrics.write_retries >= 1);
}

// =============================================================================
// Client Versions
// =============================================================================

/// A stale client version fails the row permanently, without retries.
#[tokio::test]
async fn test_stale_client_version() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    store.load("docs", vec![json!({"id": 1})]).unwrap();
    let engine = Engine::new(store.clone(), HorizonConfig::permissive());

    let fresh = engine
        .run(write("update", vec![json!({"id": 1, "$hz_v$": 0, "a": 1})]))
        .await;
    assert_eq!(write_results(&fresh), vec![json!({"id": 1, "$hz_v$": 1})]);

    let stale = engine
        .run(write("update", vec![json!({"id": 1, "$hz_v$": 0, "a": 2})]))
        .await;
    assert_eq!(write_results(&stale)[0]["error_code"], json!("INVALIDATED_DOCUMENT"));

    let doc = store.get("docs", &json!(1)).await.unwrap().unwrap();
    assert_eq!(doc["a"], json!(1));
    assert_eq!(engine.metrics.snapshot().write_retries, 0);
}

// =============================================================================
// Existence Semantics
// =============================================================================

/// Removing an absent document succeeds; updating one does not.
#[tokio::test]
async fn test_remove_missing_vs_update_missing() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    let engine = Engine::new(store, HorizonConfig::permissive());

    let removed = engine.run(write("remove", vec![json!({"id": "ghost"})])).await;
    assert_eq!(write_results(&removed), vec![json!({"id": "ghost"})]);

    let updated = engine.run(write("update", vec![json!({"id": "ghost", "a": 1})])).await;
    assert_eq!(write_results(&updated)[0]["error_code"], json!("MISSING_DOCUMENT"));
}

/// One failing row does not fail the batch.
#[tokio::test]
async fn test_partial_batch() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    store.load("docs", vec![json!({"id": 1})]).unwrap();
    let engine = Engine::new(store, HorizonConfig::permissive());

    let responses = engine
        .run(write("insert", vec![json!([{"id": 1}, {"id": 2}, {"name": "generated"}])]))
        .await;
    assert_eq!(error_code(&responses), None);

    let results = write_results(&responses);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["error_code"], json!("DOCUMENT_EXISTS"));
    assert_eq!(results[1], json!({"id": 2, "$hz_v$": 0}));
    assert!(results[2]["id"].as_str().is_some());
}

/// Removing a present document reports the version it removed.
#[tokio::test]
async fn test_remove_present() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    store.load("docs", vec![json!({"id": 1})]).unwrap();
    let engine = Engine::new(store.clone(), HorizonConfig::permissive());

    let responses = engine.run(write("remove", vec![json!({"id": 1})])).await;
    assert_eq!(write_results(&responses), vec![json!({"id": 1, "$hz_v$": 0})]);
    assert_eq!(store.get("docs", &json!(1)).await.unwrap(), None);
}

// =============================================================================
// Permissions
// =============================================================================

/// Rows the client may not write fail individually.
#[tokio::test]
async fn test_ownership_rule() {
    let store = Arc::new(MemoryStore::with_tables(&["docs"]));
    let config = HorizonConfig {
        permissions: PermissionsConfig {
            enabled: true,
            rules: vec![PermissionRule::new(
                "docs",
                RulePolicy::Ownership {
                    owner_field: "owner".into(),
                },
            )],
        },
        ..HorizonConfig::default()
    };
    let engine = Engine::new(store, config);

    let responses = engine
        .run_as(
            ClientContext::authenticated("u1"),
            write(
                "store",
                vec![json!({"id": 1, "owner": "u1"}), json!({"id": 2, "owner": "u2"})],
            ),
        )
        .await;

    let results = write_results(&responses);
    assert_eq!(results[0], json!({"id": 1, "$hz_v$": 0}));
    assert_eq!(results[1]["error_code"], json!("UNAUTHORIZED"));
}
