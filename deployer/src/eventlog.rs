//! Append-only event log
//!
//! Every state transition across the core components lands here as a
//! timestamped entry. Entries are never mutated or removed.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::events::{Event, EventBus};

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonically increasing sequence number; ties in wall-clock time
    /// are broken by this
    pub seq: u64,

    /// Wall-clock timestamp at append time
    pub timestamp: DateTime<Utc>,

    /// Entry severity
    pub severity: Severity,

    /// Human-readable message
    pub message: String,
}

/// In-memory append-only log
pub struct EventLog {
    entries: RwLock<Vec<LogEntry>>,
    bus: Arc<EventBus>,
}

impl EventLog {
    /// Create a new empty log publishing [`Event::LogAppended`] on the bus
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Append an entry; always succeeds and never blocks on subscribers
    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let entry = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let entry = LogEntry {
                seq: entries.len() as u64,
                timestamp: Utc::now(),
                severity,
                message: message.into(),
            };
            entries.push(entry.clone());
            entry
        };
        self.bus.publish(Event::LogAppended(entry));
    }

    /// Append with severity info
    pub fn info(&self, message: impl Into<String>) {
        self.append(Severity::Info, message);
    }

    /// Append with severity success
    pub fn success(&self, message: impl Into<String>) {
        self.append(Severity::Success, message);
    }

    /// Append with severity error
    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    /// Record an error in the log and hand it back to the caller
    pub fn reject(&self, err: DeployerError) -> DeployerError {
        self.error(err.to_string());
        err
    }

    /// The `n` most recent entries in append order, or all if fewer exist
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_log() -> EventLog {
        EventLog::new(Arc::new(EventBus::default()))
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let log = new_log();
        log.info("first");
        log.success("second");
        log.error("third");

        let entries = log.tail(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[1].seq, 1);
        assert_eq!(entries[2].seq, 2);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_tail_bounds() {
        let log = new_log();
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }

        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "entry 3");
        assert_eq!(tail[1].message, "entry 4");

        // Asking for more than exists returns everything
        assert_eq!(log.tail(100).len(), 5);
        assert_eq!(log.tail(0).len(), 0);
    }

    #[test]
    fn test_log_appended_event_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let log = EventLog::new(bus);

        log.info("hello");

        match rx.try_recv() {
            Ok(Event::LogAppended(entry)) => {
                assert_eq!(entry.message, "hello");
                assert_eq!(entry.severity, Severity::Info);
            }
            other => panic!("expected LogAppended, got {:?}", other),
        }
    }
}
