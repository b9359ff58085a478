//! Observable events
//!
//! Events are explicit and typed; `as_str` is the `event` field of the log line.

use std::fmt;

/// Observable events in the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Registry
    /// A plugin's methods were registered
    PluginActivated,
    /// A plugin's methods were removed
    PluginDeactivated,
    /// A plugin or method was rejected at registration
    RegistrationRejected,

    // Readiness
    /// A readiness source became ready
    ReadinessReady,
    /// A readiness source became unready
    ReadinessUnready,
    /// A readiness source was closed
    ReadinessClosed,
    /// A readiness subscriber callback failed
    ReadinessCallbackFailed,

    // Requests
    /// A request entered the pipeline
    RequestStart,
    /// A request terminal completed
    RequestComplete,
    /// A request was aborted with an error
    RequestFailed,

    // Writes
    /// Rows lost a version race and are retried
    WriteRetry,
    /// Rows were still unresolved at the deadline
    WriteTimeout,

    // Collections
    /// A collection was created on first use
    CollectionCreated,

    // Subscriptions
    /// A change feed was opened
    SubscriptionOpen,
    /// A change feed cursor was released
    SubscriptionClose,
    /// A change feed produced an event that could not be applied
    ProtocolViolation,

    // Sessions
    /// A client session was opened
    SessionOpen,
    /// A client session was closed
    SessionClose,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PluginActivated => "PLUGIN_ACTIVATED",
            Event::PluginDeactivated => "PLUGIN_DEACTIVATED",
            Event::RegistrationRejected => "REGISTRATION_REJECTED",
            Event::ReadinessReady => "READINESS_READY",
            Event::ReadinessUnready => "READINESS_UNREADY",
            Event::ReadinessClosed => "READINESS_CLOSED",
            Event::ReadinessCallbackFailed => "READINESS_CALLBACK_FAILED",
            Event::RequestStart => "REQUEST_START",
            Event::RequestComplete => "REQUEST_COMPLETE",
            Event::RequestFailed => "REQUEST_FAILED",
            Event::WriteRetry => "WRITE_RETRY",
            Event::WriteTimeout => "WRITE_TIMEOUT",
            Event::CollectionCreated => "COLLECTION_CREATED",
            Event::SubscriptionOpen => "SUBSCRIPTION_OPEN",
            Event::SubscriptionClose => "SUBSCRIPTION_CLOSE",
            Event::ProtocolViolation => "PROTOCOL_VIOLATION",
            Event::SessionOpen => "SESSION_OPEN",
            Event::SessionClose => "SESSION_CLOSE",
        }
    }

    /// Events that report a failure are logged at a raised severity
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::RegistrationRejected
                | Event::ReadinessCallbackFailed
                | Event::RequestFailed
                | Event::WriteTimeout
                | Event::ProtocolViolation
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
