//! # Protocol Module
//!
//! The shapes exchanged with the transport collaborator: parsed requests
//! in, patch streams out. Framing and sockets live outside the core.

pub mod context;
pub mod patch;
pub mod request;
pub mod response;

pub use context::ClientContext;
pub use patch::{Patch, PatchOp, ValueType};
pub use request::{Request, RequestOptions, RequestType};
pub use response::{RequestSink, Response, ResponseBody, ResponseReceiver, ResponseSink};
