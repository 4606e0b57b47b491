//! Bounded, timestamp-prefixed log lines.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::types::Timestamp;

/// Default number of log lines retained.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// One line of user-facing job log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: Timestamp, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Ring buffer that keeps only the most recent `capacity` entries,
/// evicting the oldest first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(Utc::now(), format!("line {n}"))
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = LogBuffer::with_capacity(3);
        for n in 0..10 {
            buffer.push(entry(n));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = LogBuffer::with_capacity(3);
        for n in 0..5 {
            buffer.push(entry(n));
        }

        let messages: Vec<_> = buffer.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn zero_capacity_keeps_latest_line() {
        let mut buffer = LogBuffer::with_capacity(0);
        buffer.push(entry(1));
        buffer.push(entry(2));

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.to_vec()[0].message, "line 2");
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buffer = LogBuffer::default();
        buffer.push(entry(1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_LOG_CAPACITY);
    }

    #[test]
    fn display_prefixes_time() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 9, 5, 3).unwrap();
        let line = LogEntry::new(at, "Simulation started");
        assert_eq!(line.to_string(), "[09:05:03] Simulation started");
    }
}
