//! # Readiness Module
//!
//! Liveness of upstream dependencies (store connection, collection
//! metadata) propagated through subscribe/emit instead of polling.
//!
//! - **Reliable**: one source, ready args replayed to late subscribers
//! - **ReliableUnion**: ready only while every child source is ready
//! - **ReadinessGate**: what the pipeline consults before running a request

mod tracker;
mod union;

pub use tracker::{Callbacks, ReadinessGate, Readiness, Reliable, ReliableSubscription};
pub use union::{ReliableUnion, UnionArgs};
