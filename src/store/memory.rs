//! In-memory document store
//!
//! Tables of id → document, each with a broadcast channel of raw write
//! events. A change feed subscribes and snapshots under the same lock, so
//! it never misses or double-counts a write.
//!
//! Windowed feeds (limited, not `find`) keep a mirror of every matching
//! document and report each write as the sequence of removes, the change
//! and adds that turns the old window into the new one. Offsets refer to
//! the window before each individual change is applied.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::change::{Change, FeedState};
use super::cursor::{ChangeCursor, ReleaseGuard};
use super::document::{id_key, id_of, next_version, version_of, with_version};
use super::query::QuerySpec;
use super::{DocumentStore, Expect, ReplaceOutcome};
use crate::errors::{HorizonError, HorizonResult};
use crate::reliable::Reliable;

/// Buffered write events per table before a slow feed lags
const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct TableEvent {
    old: Option<Value>,
    new: Option<Value>,
}

struct Table {
    docs: BTreeMap<String, Value>,
    events: broadcast::Sender<TableEvent>,
}

impl Table {
    fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            docs: BTreeMap::new(),
            events,
        }
    }

    fn publish(&self, old: Option<Value>, new: Option<Value>) {
        // No receivers is fine: nobody is watching this table
        let _ = self.events.send(TableEvent { old, new });
    }
}

fn key_of(doc: &Value) -> String {
    id_of(doc).map(id_key).unwrap_or_default()
}

fn missing_table(table: &str) -> HorizonError {
    HorizonError::store(format!("Table \"{}\" does not exist", table))
}

/// Embedded `DocumentStore`
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    readiness: Arc<Reliable<()>>,
    active_cursors: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// An empty store, ready immediately
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            readiness: Reliable::ready_with("memory_store", ()),
            active_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store with the given empty tables
    pub fn with_tables(names: &[&str]) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            for name in names {
                tables.insert((*name).to_string(), Table::new());
            }
        }
        store
    }

    fn read(&self) -> HorizonResult<RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables
            .read()
            .map_err(|_| HorizonError::internal("Store lock poisoned"))
    }

    fn write(&self) -> HorizonResult<RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables
            .write()
            .map_err(|_| HorizonError::internal("Store lock poisoned"))
    }

    /// Unconditionally write documents, assigning versions
    pub fn load(&self, table: &str, docs: Vec<Value>) -> HorizonResult<()> {
        let mut tables = self.write()?;
        let t = tables
            .entry(table.to_string())
            .or_insert_with(Table::new);
        for doc in docs {
            let id = id_of(&doc)
                .ok_or_else(|| HorizonError::store("Document has no id"))?
                .clone();
            let key = id_key(&id);
            let version = next_version(t.docs.get(&key));
            let doc = with_version(doc, version);
            let old = t.docs.insert(key, doc.clone());
            t.publish(old, Some(doc));
        }
        Ok(())
    }

    /// Number of change feeds not yet released
    pub fn active_cursors(&self) -> usize {
        self.active_cursors.load(Ordering::SeqCst)
    }

    /// Mark the connection lost
    pub fn disconnect(&self, reason: &str) -> HorizonResult<()> {
        self.readiness
            .emit_unready(Some(HorizonError::not_ready(reason)))
    }

    /// Mark the connection restored
    pub fn reconnect(&self) -> HorizonResult<()> {
        self.readiness.emit_ready(())
    }

    fn replace_now(
        &self,
        table: &str,
        id: &Value,
        expect: Expect,
        new: Option<Value>,
    ) -> HorizonResult<ReplaceOutcome> {
        if let Some(doc) = &new {
            if id_of(doc) != Some(id) {
                return Err(HorizonError::store("Document id does not match target id"));
            }
        }

        let mut tables = self.write()?;
        let t = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        let key = id_key(id);

        match (expect, t.docs.get(&key)) {
            (Expect::Absent, Some(current)) => {
                return Ok(ReplaceOutcome::Conflict {
                    current: Some(current.clone()),
                })
            }
            (Expect::Version(_), None) => return Ok(ReplaceOutcome::Missing),
            (Expect::Version(expected), Some(current)) if version_of(current) != expected => {
                return Ok(ReplaceOutcome::Conflict {
                    current: Some(current.clone()),
                })
            }
            _ => {}
        }

        let old = match &new {
            Some(doc) => t.docs.insert(key, doc.clone()),
            None => t.docs.remove(&key),
        };
        if old.is_some() || new.is_some() {
            t.publish(old.clone(), new.clone());
        }
        Ok(ReplaceOutcome::Written { old, new })
    }

    fn open_feed(&self, table: &str, spec: &QuerySpec) -> HorizonResult<ChangeCursor> {
        let (events, docs) = {
            let tables = self.read()?;
            let t = tables.get(table).ok_or_else(|| missing_table(table))?;
            let docs: Vec<Value> = t.docs.values().filter(|d| spec.matches(d)).cloned().collect();
            (t.events.subscribe(), docs)
        };

        let feed = Feed::new(spec.clone(), docs);
        let state = FeedStream {
            pending: feed.initial_changes().into(),
            feed,
            events,
            failed: false,
        };

        self.active_cursors.fetch_add(1, Ordering::SeqCst);
        let active = Arc::clone(&self.active_cursors);
        let guard = ReleaseGuard::new(move || {
            active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(ChangeCursor::new(
            stream::unfold(state, FeedStream::next_change).boxed(),
            guard,
        ))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn readiness(&self) -> Arc<Reliable<()>> {
        Arc::clone(&self.readiness)
    }

    fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<()>> {
        Box::pin(async move {
            self.write()?
                .entry(table.to_string())
                .or_insert_with(Table::new);
            Ok(())
        })
    }

    fn has_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<bool>> {
        Box::pin(async move { Ok(self.read()?.contains_key(table)) })
    }

    fn get<'a>(
        &'a self,
        table: &'a str,
        id: &'a Value,
    ) -> BoxFuture<'a, HorizonResult<Option<Value>>> {
        Box::pin(async move {
            let tables = self.read()?;
            let t = tables.get(table).ok_or_else(|| missing_table(table))?;
            Ok(t.docs.get(&id_key(id)).cloned())
        })
    }

    fn replace<'a>(
        &'a self,
        table: &'a str,
        id: &'a Value,
        expect: Expect,
        new: Option<Value>,
    ) -> BoxFuture<'a, HorizonResult<ReplaceOutcome>> {
        Box::pin(async move { self.replace_now(table, id, expect, new) })
    }

    fn query<'a>(
        &'a self,
        table: &'a str,
        spec: &'a QuerySpec,
    ) -> BoxFuture<'a, HorizonResult<Vec<Value>>> {
        Box::pin(async move {
            let tables = self.read()?;
            let t = tables.get(table).ok_or_else(|| missing_table(table))?;
            Ok(spec.apply(t.docs.values().cloned()))
        })
    }

    fn changes<'a>(
        &'a self,
        table: &'a str,
        spec: &'a QuerySpec,
    ) -> BoxFuture<'a, HorizonResult<ChangeCursor>> {
        Box::pin(async move { self.open_feed(table, spec) })
    }
}

/// Query-side state of one change feed
struct Feed {
    spec: QuerySpec,
    /// Every matching document by id key; windowed feeds only
    matching: BTreeMap<String, Value>,
    /// Current query result
    window: Vec<Value>,
}

impl Feed {
    fn new(spec: QuerySpec, docs: Vec<Value>) -> Self {
        let window = spec.apply(docs.iter().cloned());
        let mut matching = BTreeMap::new();
        if spec.is_windowed() {
            for doc in docs {
                matching.insert(key_of(&doc), doc);
            }
        }
        Self {
            spec,
            matching,
            window,
        }
    }

    fn initial_changes(&self) -> Vec<Change> {
        let windowed = self.spec.is_windowed();
        let mut changes = Vec::with_capacity(self.window.len() + 2);
        changes.push(Change::state(FeedState::Initializing));
        for (i, doc) in self.window.iter().enumerate() {
            changes.push(Change::initial(doc.clone(), windowed.then_some(i)));
        }
        changes.push(Change::state(FeedState::Ready));
        changes
    }

    fn apply(&mut self, event: TableEvent) -> Vec<Change> {
        if self.spec.is_windowed() {
            self.apply_windowed(event)
        } else {
            self.apply_unordered(event)
        }
    }

    fn apply_unordered(&self, event: TableEvent) -> Vec<Change> {
        let old = event.old.filter(|d| self.spec.matches(d));
        let new = event.new.filter(|d| self.spec.matches(d));
        match (old, new) {
            (Some(old), Some(new)) => vec![Change::change(old, new, None, None)],
            (Some(old), None) => vec![Change::remove(old, None)],
            (None, Some(new)) => vec![Change::add(new, None)],
            (None, None) => Vec::new(),
        }
    }

    fn apply_windowed(&mut self, event: TableEvent) -> Vec<Change> {
        let Some(key) = event.new.as_ref().or(event.old.as_ref()).map(key_of) else {
            return Vec::new();
        };
        match event.new.filter(|d| self.spec.matches(d)) {
            Some(doc) => {
                self.matching.insert(key.clone(), doc);
            }
            None => {
                self.matching.remove(&key);
            }
        }

        let next = self.spec.apply(self.matching.values().cloned());
        let changes = diff_window(&self.window, &next, &key);
        self.window = next;
        changes
    }
}

/// Changes turning `current` into `next` when only the document keyed
/// `changed` was written: departures, then the changed document, then
/// arrivals at their final indices.
fn diff_window(current: &[Value], next: &[Value], changed: &str) -> Vec<Change> {
    let next_keys: HashSet<String> = next.iter().map(key_of).collect();
    let mut working = current.to_vec();
    let mut changes = Vec::new();

    let mut i = 0;
    while i < working.len() {
        if next_keys.contains(&key_of(&working[i])) {
            i += 1;
        } else {
            let old = working.remove(i);
            changes.push(Change::remove(old, Some(i)));
        }
    }

    let staying: HashSet<String> = working.iter().map(key_of).collect();

    let old_offset = working.iter().position(|d| key_of(d) == changed);
    let new_position = next.iter().position(|d| key_of(d) == changed);
    if let (Some(old_offset), Some(new_position)) = (old_offset, new_position) {
        let new_offset = next[..new_position]
            .iter()
            .filter(|d| staying.contains(&key_of(d)))
            .count();
        let new_val = next[new_position].clone();
        let old_val = working.remove(old_offset);
        changes.push(Change::change(
            old_val,
            new_val.clone(),
            Some(old_offset),
            Some(new_offset),
        ));
        working.insert(new_offset, new_val);
    }

    for (i, doc) in next.iter().enumerate() {
        if !staying.contains(&key_of(doc)) {
            changes.push(Change::add(doc.clone(), Some(i)));
            working.insert(i, doc.clone());
        }
    }

    changes
}

/// Stream state of an open feed
struct FeedStream {
    feed: Feed,
    events: broadcast::Receiver<TableEvent>,
    pending: VecDeque<Change>,
    failed: bool,
}

impl FeedStream {
    async fn next_change(mut self) -> Option<(HorizonResult<Change>, Self)> {
        loop {
            if let Some(change) = self.pending.pop_front() {
                return Some((Ok(change), self));
            }
            if self.failed {
                return None;
            }
            match self.events.recv().await {
                Ok(event) => {
                    let changes = self.feed.apply(event);
                    self.pending.extend(changes);
                }
                Err(RecvError::Lagged(missed)) => {
                    self.failed = true;
                    let err = HorizonError::store(format!(
                        "Change feed fell behind by {} events",
                        missed
                    ));
                    return Some((Err(err), self));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
