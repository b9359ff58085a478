//! # Horizon Errors
//!
//! One error type for the whole sync engine. Variants follow the error
//! taxonomy the request pipeline, write coordinator and change-feed
//! materializer report through.

use thiserror::Error;

/// Result type for sync engine operations
pub type HorizonResult<T> = Result<T, HorizonError>;

/// Sync engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HorizonError {
    // ==================
    // Request Errors
    // ==================
    /// Malformed or conflicting request options
    #[error("{0}")]
    Validation(String),

    /// An upstream dependency is not ready
    #[error("Not ready: {0}")]
    NotReady(String),

    // ==================
    // Per-row Errors
    // ==================
    /// The permission validator rejected a document
    #[error("Operation not permitted: {0}")]
    Unauthorized(String),

    /// The document was expected to exist but does not
    #[error("The document was missing.")]
    MissingDocument(String),

    /// The document changed underneath the write (lost a race)
    #[error("The document was modified by another request.")]
    InvalidatedDocument(String),

    /// An insert targeted a document that already exists
    #[error("The document already exists.")]
    DocumentExists(String),

    /// The write deadline elapsed before the row was resolved
    #[error("Operation timed out.")]
    Timeout(String),

    // ==================
    // Change-feed Errors
    // ==================
    /// A change-stream event could not be applied
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    // ==================
    // Registration Errors
    // ==================
    /// A method with this name is already registered
    #[error("Method name conflict: {0}")]
    NameConflict(String),

    /// A plugin or method group is already active
    #[error("Method conflict: {0}")]
    MethodConflict(String),

    /// The method graph or configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ==================
    // Internal Errors
    // ==================
    /// The component has been closed
    #[error("Closed: {0}")]
    Closed(String),

    /// The backing store reported a failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HorizonError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a protocol violation
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable error code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotReady(_) => "NOT_READY",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::MissingDocument(_) => "MISSING_DOCUMENT",
            Self::InvalidatedDocument(_) => "INVALIDATED_DOCUMENT",
            Self::DocumentExists(_) => "DOCUMENT_EXISTS",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Self::NameConflict(_) => "NAME_CONFLICT",
            Self::MethodConflict(_) => "METHOD_CONFLICT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Closed(_) => "CLOSED",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client may retry the same request later
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::InvalidatedDocument(_))
    }

    /// Registration-time errors never reach a requester
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::NameConflict(_) | Self::MethodConflict(_) | Self::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for HorizonError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<std::io::Error> for HorizonError {
    fn from(e: std::io::Error) -> Self {
        Self::Configuration(e.to_string())
    }
}
