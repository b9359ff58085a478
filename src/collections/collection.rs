//! A named collection bound to one store table

use std::sync::Arc;

use serde_json::Value;

use crate::errors::HorizonResult;
use crate::store::{ChangeCursor, DocumentStore, Expect, QuerySpec, ReplaceOutcome};

/// Collection handle
///
/// Holds a shared store handle; document bodies are never cached here.
#[derive(Clone)]
pub struct Collection {
    name: String,
    table: String,
    store: Arc<dyn DocumentStore>,
}

impl Collection {
    pub fn new(name: impl Into<String>, table: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            store,
        }
    }

    /// Client-facing name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing table
    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn get(&self, id: &Value) -> HorizonResult<Option<Value>> {
        self.store.get(&self.table, id).await
    }

    /// Current state of each id, in order
    pub async fn get_many(&self, ids: &[Value]) -> HorizonResult<Vec<Option<Value>>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            docs.push(self.get(id).await?);
        }
        Ok(docs)
    }

    pub async fn replace(
        &self,
        id: &Value,
        expect: Expect,
        new: Option<Value>,
    ) -> HorizonResult<ReplaceOutcome> {
        self.store.replace(&self.table, id, expect, new).await
    }

    pub async fn query(&self, spec: &QuerySpec) -> HorizonResult<Vec<Value>> {
        self.store.query(&self.table, spec).await
    }

    pub async fn changes(&self, spec: &QuerySpec) -> HorizonResult<ChangeCursor> {
        self.store.changes(&self.table, spec).await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish()
    }
}
