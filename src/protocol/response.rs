//! Response types
//!
//! Each request yields zero or more patch batches, then exactly one
//! terminator: `complete` on success or an error object.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::patch::Patch;
use crate::errors::{HorizonError, HorizonResult};

/// Response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Patches to apply, in order
    Patch { patch: Vec<Patch> },
    /// Request finished successfully
    Complete { complete: bool },
    /// Request failed
    Error { error: String, error_code: String },
}

/// Response to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    /// A patch batch
    pub fn patch(request_id: u64, patch: Vec<Patch>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Patch { patch },
        }
    }

    /// The success terminator
    pub fn end(request_id: u64) -> Self {
        Self {
            request_id,
            body: ResponseBody::Complete { complete: true },
        }
    }

    /// The error terminator
    pub fn error(request_id: u64, error: &HorizonError) -> Self {
        Self {
            request_id,
            body: ResponseBody::Error {
                error: error.to_string(),
                error_code: error.code().to_string(),
            },
        }
    }

    /// Whether this response ends its request
    pub fn is_terminal(&self) -> bool {
        !matches!(self.body, ResponseBody::Patch { .. })
    }

    /// Serialize for the wire
    pub fn to_json(&self) -> HorizonResult<String> {
        serde_json::to_string(self).map_err(|e| HorizonError::internal(e.to_string()))
    }
}

/// Receiving half handed to the transport
pub type ResponseReceiver = mpsc::UnboundedReceiver<Response>;

/// Client channel the core writes responses to
#[derive(Debug, Clone)]
pub struct ResponseSink {
    sender: mpsc::UnboundedSender<Response>,
}

impl ResponseSink {
    /// Create a sink and the transport's receiver
    pub fn channel() -> (Self, ResponseReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Send a response; fails once the transport dropped the receiver
    pub fn send(&self, response: Response) -> HorizonResult<()> {
        self.sender
            .send(response)
            .map_err(|_| HorizonError::Closed("Client channel closed".into()))
    }

    /// Bind this sink to one request
    pub fn for_request(&self, request_id: u64) -> RequestSink {
        RequestSink {
            request_id,
            sink: self.clone(),
        }
    }

    /// Whether the transport dropped the receiver
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A response sink scoped to one request
#[derive(Debug, Clone)]
pub struct RequestSink {
    request_id: u64,
    sink: ResponseSink,
}

impl RequestSink {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Send one patch batch; empty batches are skipped
    pub fn patch(&self, patches: Vec<Patch>) -> HorizonResult<()> {
        if patches.is_empty() {
            return Ok(());
        }
        self.sink.send(Response::patch(self.request_id, patches))
    }

    /// Send the success terminator
    pub fn end(&self) -> HorizonResult<()> {
        self.sink.send(Response::end(self.request_id))
    }

    /// Send the error terminator
    pub fn error(&self, error: &HorizonError) -> HorizonResult<()> {
        self.sink.send(Response::error(self.request_id, error))
    }
}
