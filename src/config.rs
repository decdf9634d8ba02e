//! Counter configuration.
//!
//! [`Config`] holds everything a [`WindowedCounter`] needs besides its sink.
//! It is normally assembled through [`Builder`], obtained from
//! [`WindowedCounter::builder`].
//!
//! # Example
//!
//! ```rust
//! use finestra::config::ClosePolicy;
//! use finestra::logger::TracingLogger;
//! use finestra::sinks::MemorySink;
//! use finestra::{FlushOrder, WindowedCounter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let counter = WindowedCounter::builder(Duration::from_secs(10), MemorySink::new())
//!     .shards(4)
//!     .flush_order(FlushOrder::Sorted)
//!     .close_policy(ClosePolicy::Propagate)
//!     .write_deadline(Duration::from_secs(2))
//!     .logger(Arc::new(TracingLogger::new()))
//!     .start()
//!     .unwrap();
//!
//! counter.increment("requests", 1);
//! counter.close().unwrap();
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use crate::counter::WindowedCounter;
use crate::error::{Error, Result};
use crate::logger::{Logger, NoopLogger};
use crate::sink::Sink;
use crate::table::{FlushOrder, DEFAULT_SHARDS};

/// Default name of the scheduler thread.
pub const DEFAULT_THREAD_NAME: &str = "finestra-flush";

/// What [`WindowedCounter::close`] reports when the final flush fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Always return `Ok(())`; the failure is only logged.
    #[default]
    AlwaysOk,
    /// Return the final flush error to the caller.
    Propagate,
}

/// Settings for a [`WindowedCounter`].
#[derive(Clone)]
pub struct Config {
    /// Length of one window. Must be non-zero.
    pub window: Duration,
    /// Number of table shards. Must be non-zero.
    pub shards: usize,
    /// Key visiting order during a flush.
    pub flush_order: FlushOrder,
    /// Close reporting behavior.
    pub close_policy: ClosePolicy,
    /// Advisory per-write deadline passed to the sink.
    pub write_deadline: Option<Duration>,
    /// Structured logger for internal events.
    pub logger: Arc<dyn Logger>,
    /// Name of the scheduler thread.
    pub thread_name: String,
}

impl Config {
    /// Creates a configuration with defaults for everything but `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            shards: DEFAULT_SHARDS,
            flush_order: FlushOrder::default(),
            close_policy: ClosePolicy::default(),
            write_deadline: None,
            logger: Arc::new(NoopLogger),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Checks the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::InvalidWindow);
        }
        if self.shards == 0 {
            return Err(Error::InvalidShards);
        }
        Ok(())
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("window", &self.window)
            .field("shards", &self.shards)
            .field("flush_order", &self.flush_order)
            .field("close_policy", &self.close_policy)
            .field("write_deadline", &self.write_deadline)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`WindowedCounter`].
///
/// The logger can only be set here, before the scheduler starts, so it is
/// never swapped while the counter is in use.
pub struct Builder {
    config: Config,
    sink: Arc<dyn Sink>,
}

impl Builder {
    /// Starts a builder for a counter flushing to `sink` every `window`.
    pub fn new(window: Duration, sink: impl Sink + 'static) -> Self {
        Self {
            config: Config::new(window),
            sink: Arc::new(sink),
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of table shards.
    pub fn shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    /// Sets the key visiting order during a flush.
    pub fn flush_order(mut self, order: FlushOrder) -> Self {
        self.config.flush_order = order;
        self
    }

    /// Sets what `close` reports when the final flush fails.
    pub fn close_policy(mut self, policy: ClosePolicy) -> Self {
        self.config.close_policy = policy;
        self
    }

    /// Sets the advisory deadline handed to each sink call.
    pub fn write_deadline(mut self, deadline: Duration) -> Self {
        self.config.write_deadline = Some(deadline);
        self
    }

    /// Sets the structured logger.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.config.logger = logger;
        self
    }

    /// Sets the scheduler thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Returns the configuration built so far.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates the configuration and starts the counter.
    ///
    /// The scheduler loop is running when this returns.
    pub fn start(self) -> Result<WindowedCounter> {
        self.config.validate()?;
        WindowedCounter::start(self.config, self.sink)
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;

    #[test]
    fn test_defaults() {
        let config = Config::new(Duration::from_secs(1));
        assert_eq!(config.shards, DEFAULT_SHARDS);
        assert_eq!(config.flush_order, FlushOrder::Arbitrary);
        assert_eq!(config.close_policy, ClosePolicy::AlwaysOk);
        assert_eq!(config.write_deadline, None);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = Config::new(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidWindow)));
    }

    #[test]
    fn test_zero_shards_rejected() {
        let mut config = Config::new(Duration::from_secs(1));
        config.shards = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidShards)));
    }

    #[test]
    fn test_builder_setters() {
        let builder = Builder::new(Duration::from_millis(250), MemorySink::new())
            .shards(2)
            .flush_order(FlushOrder::Sorted)
            .close_policy(ClosePolicy::Propagate)
            .write_deadline(Duration::from_secs(3))
            .thread_name("metrics-flush");
        let config = builder.config();
        assert_eq!(config.window, Duration::from_millis(250));
        assert_eq!(config.shards, 2);
        assert_eq!(config.flush_order, FlushOrder::Sorted);
        assert_eq!(config.close_policy, ClosePolicy::Propagate);
        assert_eq!(config.write_deadline, Some(Duration::from_secs(3)));
        assert_eq!(config.thread_name, "metrics-flush");
    }

    #[test]
    fn test_builder_start_rejects_invalid() {
        let result = Builder::new(Duration::ZERO, MemorySink::new()).start();
        assert!(matches!(result, Err(Error::InvalidWindow)));

        let result = Builder::new(Duration::from_secs(1), MemorySink::new())
            .shards(0)
            .start();
        assert!(matches!(result, Err(Error::InvalidShards)));
    }

    #[test]
    fn test_debug_omits_logger() {
        let config = Config::new(Duration::from_secs(1));
        let debug = format!("{:?}", config);
        assert!(debug.contains("window"));
        assert!(!debug.contains("logger"));
    }
}
