//! horizon - A realtime document-collection sync engine
//!
//! Clients send requests built from named methods; the engine runs them
//! through a pipeline, coordinates optimistic writes against a document
//! store, and streams change feeds as patches on a client-side value.

pub mod collections;
pub mod config;
pub mod errors;
pub mod materializer;
pub mod methods;
pub mod observability;
pub mod permissions;
pub mod pipeline;
pub mod protocol;
pub mod reliable;
pub mod session;
pub mod store;
pub mod writes;

pub use config::HorizonConfig;
pub use errors::{HorizonError, HorizonResult};
