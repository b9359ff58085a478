//! Logging and counters
//!
//! Components report what happened through [`log_event_with_fields`];
//! nothing here feeds back into request handling. Counters live in a
//! [`MetricsRegistry`] shared by the executor and the write path.
//!
//! ```ignore
//! use horizon::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::WriteRetry, &[("rows", "2")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive`. Returns false if a global subscriber already exists.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}

fn severity_of(event: Event) -> Severity {
    if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    /// The line `log_event_with_fields` emits
    fn event_line(event: Event, fields: &[(&str, &str)]) -> String {
        Logger::render(severity_of(event), event.as_str(), fields)
    }

    fn parse(line: &str) -> serde_json::Map<String, Value> {
        match serde_json::from_str(line).unwrap() {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[test]
    fn test_event_line_layout() {
        let line = event_line(
            Event::WriteRetry,
            &[("rows", "3"), ("collection", "posts"), ("attempt", "1")],
        );
        let fields = parse(&line);
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["event", "severity", "attempt", "collection", "rows"]);
        assert_eq!(fields["event"], "WRITE_RETRY");
        assert_eq!(fields["severity"], "INFO");
        assert_eq!(fields["rows"], "3");
    }

    #[test]
    fn test_failure_events_are_raised() {
        let fields = parse(&event_line(Event::WriteTimeout, &[]));
        assert_eq!(fields["event"], "WRITE_TIMEOUT");
        assert_eq!(fields["severity"], "WARN");
        assert_eq!(fields.len(), 2);

        let fields = parse(&event_line(Event::SessionOpen, &[]));
        assert_eq!(fields["severity"], "INFO");
    }

    #[test]
    fn test_log_event_without_subscriber() {
        log_event(Event::SessionOpen);
        log_event_with_fields(Event::CollectionCreated, &[("collection", "posts")]);
    }

    #[test]
    fn test_init_logging_twice() {
        let _ = init_logging("info");
        assert!(!init_logging("info"));
    }
}
