//! # Store Module
//!
//! The backing document store, seen through the few primitives the sync
//! engine needs:
//!
//! - get a document by id
//! - conditional replace keyed on the version field
//! - filtered, ordered read
//! - change feeds with optional offsets
//!
//! Query planning, indexes and durability belong to the store. `MemoryStore`
//! is the embedded implementation.

mod change;
mod cursor;
pub mod document;
mod memory;
mod query;

pub use change::{Change, ChangeType, FeedState};
pub use cursor::{ChangeCursor, ReleaseGuard};
pub use document::{ID_FIELD, VERSION_FIELD};
pub use memory::MemoryStore;
pub use query::{Bound, BoundType, Direction, OrderSpec, QuerySpec, Selector};

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::errors::HorizonResult;
use crate::reliable::Reliable;

/// Precondition of a conditional replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The document must not exist
    Absent,
    /// The document must exist with this version (`None`: never versioned)
    Version(Option<u64>),
}

/// Result of a conditional replace
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// The write happened
    Written {
        old: Option<Value>,
        new: Option<Value>,
    },
    /// A version was expected but the document is gone
    Missing,
    /// The precondition no longer holds
    Conflict { current: Option<Value> },
}

/// Store collaborator
///
/// One shared handle serves every in-flight request; implementations must
/// not serialize requests behind a connection-wide lock.
pub trait DocumentStore: Send + Sync {
    /// Readiness of the store connection
    fn readiness(&self) -> Arc<Reliable<()>>;

    /// Create a table if it does not exist
    fn ensure_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<()>>;

    fn has_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, HorizonResult<bool>>;

    fn get<'a>(
        &'a self,
        table: &'a str,
        id: &'a Value,
    ) -> BoxFuture<'a, HorizonResult<Option<Value>>>;

    /// Replace the document `id` with `new` (`None` deletes) if `expect` holds
    fn replace<'a>(
        &'a self,
        table: &'a str,
        id: &'a Value,
        expect: Expect,
        new: Option<Value>,
    ) -> BoxFuture<'a, HorizonResult<ReplaceOutcome>>;

    fn query<'a>(
        &'a self,
        table: &'a str,
        spec: &'a QuerySpec,
    ) -> BoxFuture<'a, HorizonResult<Vec<Value>>>;

    /// Open a change feed: initial results, a `ready` state marker, then
    /// live changes. Offsets are present when the query is windowed.
    fn changes<'a>(
        &'a self,
        table: &'a str,
        spec: &'a QuerySpec,
    ) -> BoxFuture<'a, HorizonResult<ChangeCursor>>;
}
