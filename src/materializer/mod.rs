//! # Materializer Module
//!
//! Turns change notifications into a consistent client-side array, and
//! normalizes watch requests so their ordering is well defined.

mod apply;
mod rewrite;
mod view;

pub use apply::{apply_change, apply_change_value};
pub use rewrite::watch_rewrites;
pub use view::{change_to_patches, Materialized};
