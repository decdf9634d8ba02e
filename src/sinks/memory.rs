//! In-memory sink.
//!
//! [`MemorySink`] keeps every accepted write in a vector. It is meant for
//! tests and demos: failures can be injected per key or globally to exercise
//! the counter's retention behavior.

use std::collections::HashSet;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::error::SinkError;
use crate::sink::{Sink, WriteContext};

/// One accepted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The counter key.
    pub key: String,
    /// The total accumulated during the window.
    pub value: u64,
    /// The window's nominal timestamp.
    pub window: SystemTime,
    /// The window's sequence number.
    pub window_index: u64,
}

#[derive(Debug, Default)]
struct Failures {
    all: bool,
    keys: HashSet<String>,
}

/// A sink that records writes in memory.
///
/// # Example
///
/// ```rust
/// use finestra::sink::{Sink, WriteContext};
/// use finestra::sinks::MemorySink;
/// use std::time::SystemTime;
///
/// let sink = MemorySink::new();
/// let ctx = WriteContext::new(0, None);
///
/// sink.write(&ctx, "hits", 2, SystemTime::now()).unwrap();
/// sink.fail_key("misses");
/// assert!(sink.write(&ctx, "misses", 1, SystemTime::now()).is_err());
///
/// assert_eq!(sink.writes(), 1);
/// assert_eq!(sink.total("hits"), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    failures: Mutex<Failures>,
}

impl MemorySink {
    /// Creates an empty sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write for `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failures.lock().keys.insert(key.into());
    }

    /// Makes every subsequent write fail, or stops doing so.
    pub fn fail_all(&self, enabled: bool) {
        self.failures.lock().all = enabled;
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        let mut failures = self.failures.lock();
        failures.all = false;
        failures.keys.clear();
    }

    /// Returns a copy of all accepted writes, in arrival order.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Number of accepted writes.
    pub fn writes(&self) -> usize {
        self.records.lock().len()
    }

    /// Sum of all accepted values for `key`.
    pub fn total(&self, key: &str) -> u64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.key == key)
            .map(|r| r.value)
            .sum()
    }

    /// Drops all recorded writes.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Sink for MemorySink {
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        {
            let failures = self.failures.lock();
            if failures.all || failures.keys.contains(key) {
                return Err(format!("injected failure for key `{key}`").into());
            }
        }
        self.records.lock().push(Record {
            key: key.to_owned(),
            value,
            window,
            window_index: ctx.window_index(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(sink: &MemorySink, key: &str, value: u64) -> Result<(), SinkError> {
        sink.write(&WriteContext::new(1, None), key, value, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_records_writes() {
        let sink = MemorySink::new();
        write(&sink, "a", 1).unwrap();
        write(&sink, "b", 2).unwrap();
        write(&sink, "a", 3).unwrap();

        assert_eq!(sink.writes(), 3);
        assert_eq!(sink.total("a"), 4);
        assert_eq!(sink.total("b"), 2);
        assert_eq!(sink.total("c"), 0);

        let first = &sink.records()[0];
        assert_eq!(first.key, "a");
        assert_eq!(first.window, SystemTime::UNIX_EPOCH);
        assert_eq!(first.window_index, 1);
    }

    #[test]
    fn test_fail_key() {
        let sink = MemorySink::new();
        sink.fail_key("bad");
        let err = write(&sink, "bad", 1).unwrap_err();
        assert_eq!(err.to_string(), "injected failure for key `bad`");
        write(&sink, "good", 1).unwrap();
        assert_eq!(sink.writes(), 1);
    }

    #[test]
    fn test_fail_all_and_clear() {
        let sink = MemorySink::new();
        sink.fail_all(true);
        assert!(write(&sink, "a", 1).is_err());
        sink.fail_all(false);
        assert!(write(&sink, "a", 1).is_ok());

        sink.fail_key("a");
        sink.fail_all(true);
        sink.clear_failures();
        assert!(write(&sink, "a", 1).is_ok());
    }

    #[test]
    fn test_clear() {
        let sink = MemorySink::new();
        write(&sink, "a", 1).unwrap();
        sink.clear();
        assert_eq!(sink.writes(), 0);
    }
}
