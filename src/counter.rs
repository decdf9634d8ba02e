//! The windowed counter handle.
//!
//! [`WindowedCounter`] accumulates per-key increments and hands each key's
//! window total to a [`Sink`] on every tick of its scheduler thread, plus
//! once more when the counter is closed.
//!
//! # Lifecycle
//!
//! ```text
//!   new()/start() ──► Running ──close()/drop──► Draining ──► Stopped
//!        │               ▲   │
//!        │               └───┘ tick: flush, keep going on error
//!        └── scheduler thread spawned, returns immediately
//! ```
//!
//! `close` is a rendezvous: it sends the shutdown request and waits for the
//! scheduler to report the final flush before returning. No counts are lost
//! unless the sink itself fails.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::Sender;

use crate::config::{Builder, ClosePolicy, Config};
use crate::error::{Error, Result};
use crate::scheduler::{self, Done, Shared, State};
use crate::sink::Sink;

/// A concurrent counter flushed to a sink once per window.
///
/// # Examples
///
/// ```rust
/// use finestra::sinks::MemorySink;
/// use finestra::WindowedCounter;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let sink = Arc::new(MemorySink::new());
/// let counter = WindowedCounter::new(Duration::from_secs(60), Arc::clone(&sink));
///
/// counter.increment("requests", 1);
/// counter.increment("requests", 2);
/// assert_eq!(counter.get("requests"), Some(3));
///
/// // Closing flushes the last, partial window.
/// counter.close().unwrap();
/// assert_eq!(sink.total("requests"), 3);
/// ```
///
/// Multi-threaded usage:
///
/// ```rust
/// use finestra::sinks::MemorySink;
/// use finestra::WindowedCounter;
/// use std::thread;
/// use std::time::Duration;
///
/// let counter = WindowedCounter::new(Duration::from_secs(60), MemorySink::new());
///
/// thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| {
///             for _ in 0..1000 {
///                 counter.increment("hits", 1);
///             }
///         });
///     }
/// });
///
/// assert_eq!(counter.get("hits"), Some(4000));
/// ```
pub struct WindowedCounter {
    shared: Arc<Shared>,
    shutdown: Sender<Done>,
    handle: Option<JoinHandle<()>>,
}

impl WindowedCounter {
    /// Creates a counter with default settings and starts its scheduler.
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero or the scheduler thread cannot be spawned.
    /// Use [`WindowedCounter::builder`] to handle these as errors.
    pub fn new(window: Duration, sink: impl Sink + 'static) -> Self {
        match Builder::new(window, sink).start() {
            Ok(counter) => counter,
            Err(err) => panic!("failed to start windowed counter: {err}"),
        }
    }

    /// Returns a builder for a counter flushing to `sink` every `window`.
    pub fn builder(window: Duration, sink: impl Sink + 'static) -> Builder {
        Builder::new(window, sink)
    }

    /// Starts a counter from a validated configuration.
    pub(crate) fn start(config: Config, sink: Arc<dyn Sink>) -> Result<Self> {
        let thread_name = config.thread_name.clone();
        let shared = Arc::new(Shared::new(config, sink));
        let (shutdown, requests) = crossbeam_channel::bounded(1);

        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || scheduler::run(loop_shared, requests))?;

        Ok(Self {
            shared,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Adds `delta` to `key`.
    ///
    /// Safe for any number of concurrent callers. Never fails and does no
    /// I/O, but waits while a flush is in progress.
    #[inline]
    pub fn increment(&self, key: &str, delta: u64) {
        self.shared.table.increment(key, delta);
    }

    /// Flushes all pending keys now, from the calling thread.
    ///
    /// Returns the number of keys written, or the first sink error. Keys not
    /// written stay pending for the next flush.
    pub fn flush_now(&self) -> Result<usize> {
        self.shared.flush(SystemTime::now())
    }

    /// Returns the pending total for `key`.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.shared.table.get(key)
    }

    /// Copies all pending totals, sorted by key.
    pub fn pending(&self) -> Vec<(String, u64)> {
        self.shared.table.pending()
    }

    /// Number of keys with pending totals.
    pub fn len(&self) -> usize {
        self.shared.table.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.shared.table.is_empty()
    }

    /// Current scheduler state.
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Instant of the last flush that wrote every pending key.
    pub fn last_flush(&self) -> Option<Instant> {
        self.shared.last_flush()
    }

    /// Sequence number of the window currently being accumulated.
    pub fn window_index(&self) -> u64 {
        self.shared.window_index()
    }

    /// The configured window length.
    pub fn window(&self) -> Duration {
        self.shared.config.window
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Stops the scheduler after one final flush.
    ///
    /// Blocks until the final flush has been attempted. With the default
    /// [`ClosePolicy::AlwaysOk`] this returns `Ok(())` even if that flush
    /// failed; the failure is only logged. With [`ClosePolicy::Propagate`]
    /// the error is returned.
    pub fn close(mut self) -> Result<()> {
        let outcome = self.shutdown();
        match (outcome, self.shared.config.close_policy) {
            (Err(err), ClosePolicy::Propagate) => Err(err),
            _ => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let logger = &*self.shared.config.logger;
        logger.log("closing counter", &[("keys", &self.shared.table.len())]);

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let outcome = match self.shutdown.send(done_tx) {
            Ok(()) => done_rx.recv().unwrap_or(Err(Error::LoopTerminated)),
            Err(_) => Err(Error::LoopTerminated),
        };
        let _ = handle.join();

        logger.log("closed counter", &[]);
        outcome
    }
}

impl Drop for WindowedCounter {
    /// Performs the shutdown handshake if `close` was never called.
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl Debug for WindowedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedCounter")
            .field("window", &self.shared.config.window)
            .field("state", &self.shared.state())
            .field("table", &self.shared.table)
            .finish()
    }
}
