//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; metrics never influence execution

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for the sync engine
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Requests that entered the pipeline
    requests_started: AtomicU64,
    /// Requests aborted with an error
    requests_failed: AtomicU64,
    /// Rows committed by the write coordinator
    rows_committed: AtomicU64,
    /// Rows that ended in a per-row error
    rows_failed: AtomicU64,
    /// Retry rounds taken after a lost version race
    write_retries: AtomicU64,
    /// Rows that failed with a timeout
    write_timeouts: AtomicU64,
    /// Change feeds opened
    subscriptions_opened: AtomicU64,
    /// Change feed cursors released
    subscriptions_closed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment requests started
    pub fn increment_requests_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment requests failed
    pub fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add committed rows
    pub fn add_rows_committed(&self, rows: u64) {
        self.rows_committed.fetch_add(rows, Ordering::Relaxed);
    }

    /// Add failed rows
    pub fn add_rows_failed(&self, rows: u64) {
        self.rows_failed.fetch_add(rows, Ordering::Relaxed);
    }

    /// Increment write retry rounds
    pub fn increment_write_retries(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Add timed-out rows
    pub fn add_write_timeouts(&self, rows: u64) {
        self.write_timeouts.fetch_add(rows, Ordering::Relaxed);
    }

    /// Increment subscriptions opened
    pub fn increment_subscriptions_opened(&self) {
        self.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment subscriptions closed
    pub fn increment_subscriptions_closed(&self) {
        self.subscriptions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            rows_committed: self.rows_committed.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            subscriptions_opened: self.subscriptions_opened.load(Ordering::Relaxed),
            subscriptions_closed: self.subscriptions_closed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metric values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_started: u64,
    pub requests_failed: u64,
    pub rows_committed: u64,
    pub rows_failed: u64,
    pub write_retries: u64,
    pub write_timeouts: u64,
    pub subscriptions_opened: u64,
    pub subscriptions_closed: u64,
}

impl MetricsSnapshot {
    /// Change feeds currently open
    pub fn subscriptions_active(&self) -> u64 {
        self.subscriptions_opened
            .saturating_sub(self.subscriptions_closed)
    }
}
