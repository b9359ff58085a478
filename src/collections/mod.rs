//! # Collections Module
//!
//! Named collections and the metadata cache that resolves them.

mod collection;
mod metadata;

pub use collection::Collection;
pub use metadata::{Metadata, RESERVED_PREFIX};
