//! The background flush loop.
//!
//! Each counter owns exactly one scheduler thread, started at construction
//! and stopped by the shutdown handshake. The thread multiplexes three
//! channels with `crossbeam_channel::select!`:
//!
//! ```text
//!             ┌──────────── tick (every window) ───► flush(tick time)
//!             │                                          │ Err
//!   Running ──┼──────────── failures ◄───────────────────┘
//!             │                └──► log "error received"
//!             │
//!             └──────────── shutdown(done) ──► Draining ──► flush(now)
//!                                                             │
//!                               done.send(outcome) ◄──────────┘
//!                                        │
//!                                     Stopped
//! ```
//!
//! Tick failures go through a fire-and-forget channel that only feeds the
//! log. The shutdown outcome goes through a one-shot channel supplied by the
//! closer, so the two never share a primitive.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use atomic_time::AtomicOptionInstant;
use crossbeam_channel::{select, Receiver, Sender};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::{Sink, WriteContext};
use crate::table::AccumulationTable;

/// One-shot channel the scheduler answers a shutdown request on.
pub(crate) type Done = Sender<Result<()>>;

/// Lifecycle of the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Flushing on every tick.
    Running = 0,
    /// Shutdown received; the final flush is in progress.
    Draining = 1,
    /// The loop has exited.
    Stopped = 2,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => State::Running,
            1 => State::Draining,
            _ => State::Stopped,
        }
    }

    /// Returns `true` once the loop has exited.
    pub fn is_terminal(&self) -> bool {
        *self == State::Stopped
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Running => "running",
            State::Draining => "draining",
            State::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// State shared between the counter handle and its scheduler thread.
pub(crate) struct Shared {
    pub(crate) table: AccumulationTable,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) config: Config,
    state: AtomicU8,
    window_index: AtomicU64,
    last_flush: AtomicOptionInstant,
}

impl Shared {
    pub(crate) fn new(config: Config, sink: Arc<dyn Sink>) -> Self {
        Self {
            table: AccumulationTable::new(config.shards),
            sink,
            config,
            state: AtomicU8::new(State::Running as u8),
            window_index: AtomicU64::new(0),
            last_flush: AtomicOptionInstant::none(),
        }
    }

    pub(crate) fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Sequence number of the window currently being accumulated.
    pub(crate) fn window_index(&self) -> u64 {
        self.window_index.load(Ordering::Relaxed)
    }

    /// Instant of the last flush pass that wrote every pending key.
    pub(crate) fn last_flush(&self) -> Option<Instant> {
        self.last_flush.load(Ordering::Relaxed)
    }

    /// Runs one flush pass stamped with `now`.
    pub(crate) fn flush(&self, now: SystemTime) -> Result<usize> {
        let deadline = self
            .config
            .write_deadline
            .and_then(|d| Instant::now().checked_add(d));
        let ctx = WriteContext::new(self.window_index(), deadline);
        let written = self.table.drain(
            &*self.sink,
            &ctx,
            now,
            self.config.flush_order,
            &*self.config.logger,
        )?;
        self.last_flush.store(Some(Instant::now()), Ordering::Relaxed);
        Ok(written)
    }
}

/// Projects monotonic instants onto the wall clock.
///
/// Every timestamp handed to the sink goes through the same anchor, so
/// windows never go backwards even if the system clock is stepped.
#[derive(Debug, Clone, Copy)]
struct WallClock {
    anchor: Instant,
    wall: SystemTime,
}

impl WallClock {
    fn new() -> Self {
        Self::anchored(SystemTime::now())
    }

    fn anchored(wall: SystemTime) -> Self {
        Self {
            anchor: Instant::now(),
            wall,
        }
    }

    fn at(&self, instant: Instant) -> SystemTime {
        self.wall + instant.saturating_duration_since(self.anchor)
    }

    fn now(&self) -> SystemTime {
        self.at(Instant::now())
    }
}

/// Runs the scheduler until a shutdown request arrives.
///
/// A disconnected shutdown channel counts as a request with nobody waiting
/// for the answer.
pub(crate) fn run(shared: Arc<Shared>, shutdown: Receiver<Done>) {
    run_with_clock(shared, shutdown, WallClock::new());
}

fn run_with_clock(shared: Arc<Shared>, shutdown: Receiver<Done>, clock: WallClock) {
    let logger = &*shared.config.logger;
    let (fail_tx, fail_rx) = crossbeam_channel::unbounded::<Error>();
    let ticker = crossbeam_channel::tick(shared.config.window);

    loop {
        select! {
            recv(ticker) -> tick => {
                if let Ok(at) = tick {
                    let now = clock.at(at);
                    let window = shared.window_index();
                    logger.log(
                        "tick received",
                        &[("unix_ms", &unix_ms(now)), ("window", &window)],
                    );
                    if let Err(err) = shared.flush(now) {
                        logger.log("flush failed", &[("window", &window), ("err", &err)]);
                        // The receiver lives in this function, so send cannot fail.
                        let _ = fail_tx.send(err);
                    }
                    shared.window_index.fetch_add(1, Ordering::Relaxed);
                }
            }
            recv(fail_rx) -> err => {
                if let Ok(err) = err {
                    logger.log("error received", &[("err", &err)]);
                }
            }
            recv(shutdown) -> done => {
                logger.log("quit received", &[]);
                shared.set_state(State::Draining);

                for err in fail_rx.try_iter() {
                    logger.log("error received", &[("err", &err)]);
                }

                let outcome = shared.flush(clock.now()).map(|_| ());
                match &outcome {
                    Ok(()) => logger.log("final flush complete", &[]),
                    Err(err) => logger.log("final flush failed", &[("err", err)]),
                }

                shared.set_state(State::Stopped);
                if let Ok(done) = done {
                    let _ = done.send(outcome);
                }
                return;
            }
        }
    }
}

/// Milliseconds since the Unix epoch, or 0 for times before it.
fn unix_ms(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
