//! # Finestra - Windowed Counters Flushed to a Sink
//!
//! A process-local counter for metrics emission: callers increment named keys
//! from any number of threads, and once per window the accumulated totals are
//! handed to a pluggable [`Sink`] and reset. Closing the counter flushes the
//! final, partial window.
//!
//! This is a building block, not a metrics system. Counting is sum-only, per
//! key, per window.
//!
//! ## How It Works
//!
//! ```text
//!   increment(k, d) ──► AccumulationTable ◄── drain ── scheduler thread
//!   (any thread)        key → running total            │
//!                                                      ├─ tick every window
//!                                                      └─ shutdown (close/drop)
//!                                                              │
//!                                                              ▼
//!                                              Sink::write(ctx, key, total, window)
//! ```
//!
//! 1. **Accumulation**: [`WindowedCounter::increment`] adds to a key's total
//!    under a shard lock. It never fails and never does I/O.
//! 2. **Flush**: on each tick the scheduler locks the whole table, writes every
//!    key to the sink and removes the keys the sink accepted. The first sink
//!    error aborts the pass; unvisited and failed keys stay pending.
//! 3. **Shutdown**: [`WindowedCounter::close`] asks the scheduler for one last
//!    flush and waits for its outcome before returning.
//!
//! Because the table stays locked for the whole flush, increments issued
//! during a flush wait and land in the next window. No increment is lost.
//!
//! ## Quick Start
//!
//! ```rust
//! use finestra::sinks::MemorySink;
//! use finestra::WindowedCounter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sink = Arc::new(MemorySink::new());
//! let counter = WindowedCounter::new(Duration::from_secs(10), Arc::clone(&sink));
//!
//! counter.increment("http_requests", 1);
//! counter.increment("http_requests", 1);
//! counter.increment("http_errors", 1);
//!
//! counter.close().unwrap();
//!
//! assert_eq!(sink.total("http_requests"), 2);
//! assert_eq!(sink.total("http_errors"), 1);
//! ```
//!
//! ## Writing a Sink
//!
//! ```rust
//! use finestra::sink::{Sink, WriteContext};
//! use finestra::SinkError;
//! use std::time::SystemTime;
//!
//! struct Stdout;
//!
//! impl Sink for Stdout {
//!     fn write(
//!         &self,
//!         ctx: &WriteContext,
//!         key: &str,
//!         value: u64,
//!         window: SystemTime,
//!     ) -> Result<(), SinkError> {
//!         println!("[{}] {key}={value} @ {window:?}", ctx.window_index());
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Failure Semantics
//!
//! Sink failures are never surfaced to `increment` callers. During a tick they
//! are logged and the loop keeps running; the affected keys are retried on the
//! next tick. During shutdown they are logged and, under the default
//! [`ClosePolicy::AlwaysOk`](config::ClosePolicy), `close` still returns
//! `Ok(())`. Use [`ClosePolicy::Propagate`](config::ClosePolicy) to receive the
//! error instead. There are no retries beyond the natural next flush.
//!
//! ## Feature Flags
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `serde` | [`snapshot`] | Serializable snapshots of pending counts |
//! | `json` | [`sinks::json`] | Newline-delimited JSON sink |
//! | `full` | All of the above | |

pub mod config;
pub mod counter;
pub mod error;
pub mod logger;
pub mod scheduler;
pub mod sink;
pub mod sinks;
pub mod table;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use config::{Builder, ClosePolicy, Config};
pub use counter::WindowedCounter;
pub use error::{Error, Result, SinkError};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use scheduler::State;
pub use sink::{Sink, SinkFn, WriteContext};
pub use table::FlushOrder;
