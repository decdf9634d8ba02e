//! The persistence contract for completed windows.
//!
//! A [`Sink`] receives one call per key per flushed window. Each call carries
//! the total accumulated for that key during the window only, never a running
//! total, so sinks can safely be called for the same key many times.
//!
//! # Example
//!
//! ```rust
//! use finestra::sink::{Sink, SinkFn, WriteContext};
//! use std::time::SystemTime;
//!
//! let sink = SinkFn::new(|_ctx: &WriteContext, key: &str, value: u64, _window: SystemTime| {
//!     println!("{key} = {value}");
//!     Ok(())
//! });
//!
//! let ctx = WriteContext::new(0, None);
//! assert!(sink.write(&ctx, "requests", 10, SystemTime::now()).is_ok());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::error::SinkError;

/// Per-call context handed to a [`Sink`].
///
/// The counter never cancels a write; `deadline` is advisory and only set
/// when the counter was built with
/// [`write_deadline`](crate::config::Builder::write_deadline). Sinks doing
/// I/O should respect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    window_index: u64,
    deadline: Option<Instant>,
}

impl WriteContext {
    /// Creates a context for the window with sequence number `window_index`.
    pub fn new(window_index: u64, deadline: Option<Instant>) -> Self {
        Self {
            window_index,
            deadline,
        }
    }

    /// Sequence number of the window being flushed, starting at 0.
    pub fn window_index(&self) -> u64 {
        self.window_index
    }

    /// The instant by which the sink should give up, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means no deadline was set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` if a deadline was set and has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }
}

/// Persists one key's total for a completed window.
pub trait Sink: Send + Sync {
    /// Persists `value` for `key` in the window that ended at `window`.
    ///
    /// The timestamp is the time the tick fired, which can differ from the
    /// current time. Returning an error tells the counter it is not safe to
    /// reset `key`; its value is kept and retried on the next flush.
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        (**self).write(ctx, key, value, window)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        (**self).write(ctx, key, value, window)
    }
}

impl<S: Sink + ?Sized> Sink for &S {
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        (**self).write(ctx, key, value, window)
    }
}

/// Adapts a closure into a [`Sink`].
pub struct SinkFn<F> {
    f: F,
}

impl<F> SinkFn<F>
where
    F: Fn(&WriteContext, &str, u64, SystemTime) -> Result<(), SinkError> + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Sink for SinkFn<F>
where
    F: Fn(&WriteContext, &str, u64, SystemTime) -> Result<(), SinkError> + Send + Sync,
{
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        (self.f)(ctx, key, value, window)
    }
}

impl<F> fmt::Debug for SinkFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkFn").finish_non_exhaustive()
    }
}
