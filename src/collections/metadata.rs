//! Collection metadata cache
//!
//! Resolves collection names to tables lazily and caches the result. The
//! cache is dropped whenever the store connection goes unready, since
//! tables may have changed while disconnected.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use super::collection::Collection;
use crate::config::HorizonConfig;
use crate::errors::{HorizonError, HorizonResult};
use crate::observability::{log_event_with_fields, Event};
use crate::reliable::{Callbacks, Reliable, ReliableSubscription, ReliableUnion};
use crate::store::DocumentStore;

/// Prefix of tables reserved for internal use
pub const RESERVED_PREFIX: &str = "hz_";

type Cache = RwLock<HashMap<String, Arc<Collection>>>;

/// Collection metadata
pub struct Metadata {
    store: Arc<dyn DocumentStore>,
    auto_create: bool,
    cache: Arc<Cache>,
    ready: Arc<Reliable<()>>,
    readiness: Arc<ReliableUnion<()>>,
    store_watch: ReliableSubscription,
}

impl Metadata {
    /// Create the cache and its combined readiness (store + metadata)
    pub fn new(store: Arc<dyn DocumentStore>, config: &HorizonConfig) -> HorizonResult<Arc<Self>> {
        let ready = Reliable::new("metadata");
        let readiness = ReliableUnion::new(
            "horizon",
            vec![
                ("store".to_string(), store.readiness()),
                ("metadata".to_string(), Arc::clone(&ready)),
            ],
        )?;

        let cache: Arc<Cache> = Arc::new(RwLock::new(HashMap::new()));
        let weak: Weak<Cache> = Arc::downgrade(&cache);
        let store_watch = store.readiness().subscribe(Callbacks::new().on_unready(move |_| {
            if let Some(cache) = weak.upgrade() {
                cache
                    .write()
                    .map_err(|_| HorizonError::internal("Metadata lock poisoned"))?
                    .clear();
            }
            Ok(())
        }))?;

        ready.emit_ready(())?;

        Ok(Arc::new(Self {
            store,
            auto_create: config.auto_create_collection,
            cache,
            ready,
            readiness,
            store_watch,
        }))
    }

    /// Combined readiness of the store and the metadata
    pub fn readiness(&self) -> Arc<ReliableUnion<()>> {
        Arc::clone(&self.readiness)
    }

    fn cached(&self, name: &str) -> HorizonResult<Option<Arc<Collection>>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| HorizonError::internal("Metadata lock poisoned"))?;
        Ok(cache.get(name).cloned())
    }

    /// Resolve a collection by name
    pub async fn collection(&self, name: &str) -> HorizonResult<Arc<Collection>> {
        if name.is_empty() {
            return Err(HorizonError::validation("Collection name must not be empty"));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(HorizonError::validation(format!(
                "Collection \"{}\" is reserved for internal use",
                name
            )));
        }
        if let Some(collection) = self.cached(name)? {
            return Ok(collection);
        }

        if !self.store.has_table(name).await? {
            if !self.auto_create {
                return Err(HorizonError::validation(format!(
                    "Collection \"{}\" does not exist.",
                    name
                )));
            }
            self.store.ensure_table(name).await?;
            log_event_with_fields(Event::CollectionCreated, &[("collection", name)]);
        }

        let collection = Arc::new(Collection::new(name, name, Arc::clone(&self.store)));
        let mut cache = self
            .cache
            .write()
            .map_err(|_| HorizonError::internal("Metadata lock poisoned"))?;
        // A concurrent resolve may have won; keep the first entry
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(collection)))
    }

    /// Names currently cached
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Stop tracking the store and close readiness
    pub fn close(&self, reason: &str) {
        self.store_watch.close();
        self.readiness.close(reason);
        self.ready.close(reason);
    }
}
