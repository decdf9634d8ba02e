//! Snapshot types for serializing pending counts.
//!
//! A [`Snapshot`] is a point-in-time copy of everything a counter has
//! accumulated but not yet flushed. Taking one does not reset anything.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! finestra = { version = "0.1", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use finestra::sinks::MemorySink;
//! use finestra::WindowedCounter;
//! use std::time::Duration;
//!
//! let counter = WindowedCounter::new(Duration::from_secs(60), MemorySink::new());
//! counter.increment("requests", 42);
//!
//! let snapshot = counter.snapshot();
//! let json = serde_json::to_string(&snapshot).unwrap();
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::counter::WindowedCounter;

/// One pending key and its total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountEntry {
    /// The counter key.
    pub key: String,
    /// The total accumulated since the key was last flushed.
    pub value: u64,
}

/// Pending counts of a counter at one instant, sorted by key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Milliseconds since the Unix epoch when the snapshot was taken.
    pub taken_at_ms: u64,
    /// Sequence number of the window being accumulated.
    pub window_index: u64,
    /// The pending entries.
    pub counts: Vec<CountEntry>,
}

impl Snapshot {
    /// Creates a snapshot from `(key, value)` pairs.
    pub fn new(
        taken_at_ms: u64,
        window_index: u64,
        counts: impl IntoIterator<Item = (String, u64)>,
    ) -> Self {
        Self {
            taken_at_ms,
            window_index,
            counts: counts
                .into_iter()
                .map(|(key, value)| CountEntry { key, value })
                .collect(),
        }
    }

    /// Finds an entry by key.
    pub fn get(&self, key: &str) -> Option<&CountEntry> {
        self.counts.iter().find(|c| c.key == key)
    }

    /// Sum of all pending values.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.value))
    }
}

impl WindowedCounter {
    /// Takes a serializable copy of the pending counts.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(current_timestamp_ms(), self.window_index(), self.pending())
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;
    use std::time::Duration;

    #[test]
    fn test_snapshot_new() {
        let snapshot = Snapshot::new(10, 0, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(snapshot.counts.len(), 2);
        assert_eq!(snapshot.taken_at_ms, 10);
        assert_eq!(snapshot.total(), 3);
    }

    #[test]
    fn test_snapshot_get() {
        let snapshot = Snapshot::new(0, 0, vec![("foo".to_string(), 1)]);
        assert_eq!(snapshot.get("foo").map(|c| c.value), Some(1));
        assert!(snapshot.get("bar").is_none());
    }

    #[test]
    fn test_counter_snapshot_does_not_reset() {
        let counter = WindowedCounter::new(Duration::from_secs(3600), MemorySink::new());
        counter.increment("b", 2);
        counter.increment("a", 1);

        let snapshot = counter.snapshot();
        assert_eq!(
            snapshot.counts,
            vec![
                CountEntry {
                    key: "a".to_string(),
                    value: 1
                },
                CountEntry {
                    key: "b".to_string(),
                    value: 2
                },
            ]
        );
        assert!(snapshot.taken_at_ms > 0);
        assert_eq!(counter.get("a"), Some(1));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_serialize_snapshot() {
        let snapshot = Snapshot::new(1234567890, 3, vec![("a".to_string(), 1)]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            json,
            r#"{"taken_at_ms":1234567890,"window_index":3,"counts":[{"key":"a","value":1}]}"#
        );
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
