//! JSON event lines handed to `tracing`
//!
//! A line is one object: `event`, then `severity`, then the caller's
//! fields sorted by key. Keys keep insertion order (`preserve_order`).

use std::fmt;

use serde_json::{Map, Value};

/// How loud a line is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    /// Recoverable, e.g. a write retry
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless entry point; the installed `tracing` subscriber decides
/// where lines go
pub struct Logger;

impl Logger {
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        match severity {
            Severity::Trace => tracing::trace!(target: "horizon", "{line}"),
            Severity::Info => tracing::info!(target: "horizon", "{line}"),
            Severity::Warn => tracing::warn!(target: "horizon", "{line}"),
            Severity::Error => tracing::error!(target: "horizon", "{line}"),
        }
    }

    /// The line `log` would emit. Later duplicates of a key win.
    pub fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut line = Map::with_capacity(fields.len() + 2);
        line.insert("event".into(), Value::from(event));
        line.insert("severity".into(), Value::from(severity.as_str()));
        for (key, value) in sorted {
            if matches!(*key, "event" | "severity") {
                continue;
            }
            line.insert((*key).to_string(), Value::from(*value));
        }
        Value::Object(line).to_string()
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(line: &str) -> Vec<String> {
        let parsed: Value = serde_json::from_str(line).unwrap();
        parsed.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn test_layout() {
        let line = Logger::render(
            Severity::Warn,
            "WRITE_RETRY",
            &[("rows", "2"), ("collection", "posts"), ("attempt", "1")],
        );
        assert_eq!(
            keys(&line),
            vec!["event", "severity", "attempt", "collection", "rows"]
        );

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "WRITE_RETRY");
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["rows"], "2");
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = Logger::render(Severity::Info, "E", &[("b", "1"), ("a", "2")]);
        let b = Logger::render(Severity::Info, "E", &[("a", "2"), ("b", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reserved_keys_are_not_overwritten() {
        let line = Logger::render(Severity::Info, "REAL", &[("event", "fake")]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "REAL");
    }

    #[test]
    fn test_values_are_escaped() {
        let line = Logger::render(Severity::Error, "E", &[("reason", "say \"hi\"\nbye")]);
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["reason"], "say \"hi\"\nbye");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_log_without_subscriber() {
        Logger::trace("E", &[]);
        Logger::error("E", &[("reason", "none")]);
    }
}
