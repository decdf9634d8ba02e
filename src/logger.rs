//! Structured logging hook used by the counter internals.
//!
//! The counter never talks to a logging backend directly. It emits a message
//! plus name/value pairs through the [`Logger`] trait, which discards
//! everything by default ([`NoopLogger`]). Applications that use `tracing`
//! can plug in [`TracingLogger`].
//!
//! # Example
//!
//! ```rust
//! use finestra::logger::{Field, Logger};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<String>>);
//!
//! impl Logger for Collect {
//!     fn log(&self, msg: &str, fields: &[Field<'_>]) {
//!         let line = fields
//!             .iter()
//!             .fold(msg.to_string(), |acc, (k, v)| format!("{acc} {k}={v}"));
//!         self.0.lock().unwrap().push(line);
//!     }
//! }
//!
//! let logger = Collect::default();
//! logger.log("writing count", &[("key", &"hits"), ("value", &3u64)]);
//! assert_eq!(logger.0.lock().unwrap()[0], "writing count key=hits value=3");
//! ```

use std::fmt::{self, Display};

use tracing::Level;

/// A single structured field: a name and a displayable value.
pub type Field<'a> = (&'a str, &'a dyn Display);

/// Abstract structured logger.
///
/// Implementations must not fail observably; the counter ignores whatever
/// happens inside `log`.
pub trait Logger: Send + Sync {
    /// Records `msg` together with its name/value `fields`.
    fn log(&self, msg: &str, fields: &[Field<'_>]);
}

/// A logger that discards all input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    #[inline]
    fn log(&self, _msg: &str, _fields: &[Field<'_>]) {}
}

/// A logger that forwards every call to a `tracing` event.
///
/// Fields are rendered as a single `fields` value of the form
/// `name=value name=value`, since `tracing` field names must be known at
/// compile time.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: Level,
}

impl TracingLogger {
    /// Creates a logger emitting at `DEBUG`.
    pub const fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    /// Sets the level events are emitted at.
    pub const fn with_level(self, level: Level) -> Self {
        Self { level }
    }

    /// Returns the level events are emitted at.
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for TracingLogger {
    fn log(&self, msg: &str, fields: &[Field<'_>]) {
        let fields = Fields(fields);
        let level = self.level;
        if level == Level::TRACE {
            tracing::trace!(target: "finestra", fields = %fields, "{msg}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "finestra", fields = %fields, "{msg}");
        } else if level == Level::INFO {
            tracing::info!(target: "finestra", fields = %fields, "{msg}");
        } else if level == Level::WARN {
            tracing::warn!(target: "finestra", fields = %fields, "{msg}");
        } else {
            tracing::error!(target: "finestra", fields = %fields, "{msg}");
        }
    }
}

/// Renders a field slice as `name=value` pairs separated by spaces.
pub struct Fields<'a, 'b>(pub &'a [Field<'b>]);

impl Display for Fields<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
