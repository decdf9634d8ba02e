//! Sharded accumulation table.
//!
//! The table maps counter keys to the sum of increments received since the
//! key was last flushed. It is split into shards selected by
//! `hash(key) % shards`, each one a cache-line padded, mutex-protected map.
//!
//! ```text
//!                      ┌───────────────────────────────────┐
//!                      │          AccumulationTable        │
//!                      ├───────────────────────────────────┤
//!   increment("a") ──► │ [Shard 0] Mutex<HashMap> (padded) │
//!   increment("b") ──► │ [Shard 1] Mutex<HashMap> (padded) │
//!        ...           │    ...                            │
//!                      │ [Shard S-1] ...                   │
//!                      └───────────────────────────────────┘
//!                                      │
//!                                      ▼
//!                       drain() locks every shard, in index
//!                       order, for the whole flush pass
//! ```
//!
//! An increment holds exactly one shard lock. A drain holds all of them for
//! the entire pass, including the sink calls, so increments issued during a
//! flush wait for it to finish and land in the next window. With a single
//! shard this degenerates to one map under one lock.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::BuildHasher;
use std::time::SystemTime;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::sink::{Sink, WriteContext};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Order in which a flush visits keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushOrder {
    /// Whatever order the shards and their maps yield. Cheapest.
    #[default]
    Arbitrary,
    /// Lexicographic key order, for reproducible flushes.
    Sorted,
}

/// Key to running-total map shared between callers and the flush loop.
pub struct AccumulationTable {
    shards: Box<[CachePadded<Mutex<HashMap<String, u64>>>]>,
    hasher: RandomState,
}

impl AccumulationTable {
    /// Creates an empty table with `shards` shards.
    ///
    /// A shard count of zero is bumped to one.
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| CachePadded::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, u64>> {
        let idx = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Adds `delta` to `key`, creating it at zero if absent.
    ///
    /// The total saturates at `u64::MAX`.
    #[inline]
    pub fn increment(&self, key: &str, delta: u64) {
        let mut shard = self.shard_for(key).lock();
        match shard.get_mut(key) {
            Some(total) => *total = total.saturating_add(delta),
            None => {
                shard.insert(key.to_owned(), delta);
            }
        }
    }

    /// Returns the pending total for `key`.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.shard_for(key).lock().get(key).copied()
    }

    /// Number of keys with pending totals.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns `true` if no key has a pending total.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// Copies all pending totals, sorted by key.
    ///
    /// Every shard is locked before the copy starts, so the result reflects a
    /// single instant.
    pub fn pending(&self) -> Vec<(String, u64)> {
        let guards: Vec<MutexGuard<'_, HashMap<String, u64>>> =
            self.shards.iter().map(|s| s.lock()).collect();
        let mut out: Vec<(String, u64)> = guards
            .iter()
            .flat_map(|g| g.iter().map(|(k, v)| (k.clone(), *v)))
            .collect();
        drop(guards);
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Writes every pending key to `sink` and removes the ones it accepted.
    ///
    /// All shards stay locked for the whole pass. The pass stops at the first
    /// sink error: keys not yet visited keep their totals, as does the key
    /// that failed. Returns the number of keys written.
    pub fn drain(
        &self,
        sink: &dyn Sink,
        ctx: &WriteContext,
        now: SystemTime,
        order: FlushOrder,
        logger: &dyn Logger,
    ) -> Result<usize> {
        let mut guards: Vec<MutexGuard<'_, HashMap<String, u64>>> =
            self.shards.iter().map(|s| s.lock()).collect();

        let mut visit: Vec<(usize, String)> = guards
            .iter()
            .enumerate()
            .flat_map(|(idx, g)| g.keys().map(move |k| (idx, k.clone())))
            .collect();
        if order == FlushOrder::Sorted {
            visit.sort_unstable_by(|a, b| a.1.cmp(&b.1));
        }

        let mut written = 0;
        for (idx, key) in visit {
            let shard = &mut guards[idx];
            let Some(&value) = shard.get(&key) else {
                continue;
            };
            logger.log("writing count", &[("key", &key), ("value", &value)]);
            if let Err(source) = sink.write(ctx, &key, value, now) {
                return Err(Error::Sink { key, source });
            }
            shard.remove(&key);
            written += 1;
            logger.log("reset count", &[("key", &key)]);
        }
        Ok(written)
    }
}

impl Default for AccumulationTable {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl Debug for AccumulationTable {
    /// Formats the table showing non-empty shards.
    ///
    /// Output format: `{ [shard]:keys [shard]:keys ... }`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, shard) in self.shards.iter().enumerate() {
            let len = shard.lock().len();
            if len != 0 {
                write!(f, " [{i}]:{len}")?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::tests::RecordingLogger;
    use crate::logger::NoopLogger;
    use crate::sinks::MemorySink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn ctx() -> WriteContext {
        WriteContext::new(0, None)
    }

    #[test]
    fn test_new_is_empty() {
        let table = AccumulationTable::new(4);
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.shards(), 4);
    }

    #[test]
    fn test_zero_shards_bumped() {
        assert_eq!(AccumulationTable::new(0).shards(), 1);
    }

    #[test]
    fn test_default_shards() {
        assert_eq!(AccumulationTable::default().shards(), DEFAULT_SHARDS);
    }

    #[test]
    fn test_increment() {
        let table = AccumulationTable::new(4);
        table.increment("unit-test", 1);
        assert_eq!(table.get("unit-test"), Some(1));
        table.increment("unit-test", 2);
        assert_eq!(table.get("unit-test"), Some(3));
        assert_eq!(table.get("other"), None);
    }

    #[test]
    fn test_increment_zero_creates_key() {
        let table = AccumulationTable::new(1);
        table.increment("k", 0);
        assert_eq!(table.get("k"), Some(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_increment_saturates() {
        let table = AccumulationTable::new(1);
        table.increment("k", u64::MAX - 1);
        table.increment("k", 5);
        assert_eq!(table.get("k"), Some(u64::MAX));
    }

    #[test]
    fn test_pending_sorted() {
        let table = AccumulationTable::new(8);
        table.increment("c", 3);
        table.increment("a", 1);
        table.increment("b", 2);
        assert_eq!(
            table.pending(),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_pending_consistent_across_shards() {
        let table = AccumulationTable::new(16);
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..20_000 {
                    table.increment("first", 1);
                    table.increment("second", 1);
                }
                done.store(true, Ordering::Release);
            });

            // "first" is always bumped before "second", so no copy may show
            // "second" ahead or "first" more than one step ahead.
            while !done.load(Ordering::Acquire) {
                let copy: HashMap<String, u64> = table.pending().into_iter().collect();
                let first = copy.get("first").copied().unwrap_or(0);
                let second = copy.get("second").copied().unwrap_or(0);
                assert!(first >= second, "first={first} second={second}");
                assert!(first - second <= 1, "first={first} second={second}");
            }
        });
    }

    #[test]
    fn test_drain_writes_and_resets() {
        let table = AccumulationTable::new(4);
        let sink = MemorySink::new();
        table.increment("unit-test", 1);

        let written = table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Arbitrary, &NoopLogger)
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(sink.writes(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_reset_after_drain() {
        let table = AccumulationTable::new(4);
        let sink = MemorySink::new();
        table.increment("k", 10);
        table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Arbitrary, &NoopLogger)
            .unwrap();
        table.increment("k", 4);
        table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Arbitrary, &NoopLogger)
            .unwrap();

        let values: Vec<u64> = sink.records().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![10, 4]);
    }

    #[test]
    fn test_drain_empty() {
        let table = AccumulationTable::new(2);
        let sink = MemorySink::new();
        let written = table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Sorted, &NoopLogger)
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(sink.writes(), 0);
    }

    #[test]
    fn test_drain_sorted_order() {
        let table = AccumulationTable::new(8);
        let sink = MemorySink::new();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            table.increment(key, 1);
        }
        table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Sorted, &NoopLogger)
            .unwrap();
        let keys: Vec<String> = sink.records().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn test_partial_failure_retains_values() {
        let table = AccumulationTable::new(4);
        let sink = MemorySink::new();
        sink.fail_key("bravo");
        table.increment("alpha", 1);
        table.increment("bravo", 2);
        table.increment("charlie", 3);

        let err = table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Sorted, &NoopLogger)
            .unwrap_err();
        assert_eq!(err.key(), Some("bravo"));

        // alpha was written before the failure; bravo and charlie are kept.
        assert_eq!(table.get("alpha"), None);
        assert_eq!(table.get("bravo"), Some(2));
        assert_eq!(table.get("charlie"), Some(3));
        assert_eq!(sink.total("alpha"), 1);
        assert_eq!(sink.total("charlie"), 0);

        // Retried on the next pass without double counting.
        sink.clear_failures();
        table.increment("bravo", 5);
        table
            .drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Sorted, &NoopLogger)
            .unwrap();
        assert_eq!(sink.total("bravo"), 7);
        assert_eq!(sink.total("charlie"), 3);
        assert_eq!(sink.total("alpha"), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_logs() {
        let table = AccumulationTable::new(1);
        let sink = MemorySink::new();
        let logger = RecordingLogger::default();
        table.increment("a", 1);
        table.increment("b", 1);
        sink.fail_key("b");

        let _ = table.drain(&sink, &ctx(), SystemTime::now(), FlushOrder::Sorted, &logger);

        assert_eq!(logger.count("writing count"), 2);
        assert_eq!(logger.count("reset count"), 1);
        assert!(logger.lines().contains(&"reset count | key=a".to_string()));
    }

    #[test]
    fn test_drain_passes_context_and_time() {
        let table = AccumulationTable::new(1);
        let sink = MemorySink::new();
        let now = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42);
        table.increment("k", 1);
        table
            .drain(
                &sink,
                &WriteContext::new(7, None),
                now,
                FlushOrder::Arbitrary,
                &NoopLogger,
            )
            .unwrap();
        let record = &sink.records()[0];
        assert_eq!(record.window, now);
        assert_eq!(record.window_index, 7);
    }

    #[test]
    fn test_concurrent_increments() {
        const THREADS: u64 = 8;
        const ITERATIONS: u64 = 1_000;
        const DELTA: u64 = 3;

        let table = Arc::new(AccumulationTable::new(4));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        table.increment("shared", DELTA);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.get("shared"), Some(THREADS * ITERATIONS * DELTA));
    }

    #[test]
    fn test_debug() {
        let table = AccumulationTable::new(1);
        table.increment("k", 1);
        assert_eq!(format!("{:?}", table), "{ [0]:1 }");
    }
}
