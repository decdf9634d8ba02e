//! Error types for windowed counters.
//!
//! The only failure the counter ever observes at runtime is a sink failing to
//! persist a value. Everything else here is either a construction error from
//! the [`Builder`](crate::config::Builder) or a report that the scheduler
//! thread went away before answering the shutdown handshake.
//!
//! # Example
//!
//! ```rust
//! use finestra::{Error, SinkError};
//!
//! let source: SinkError = "disk full".into();
//! let err = Error::Sink { key: "requests".to_string(), source };
//! assert_eq!(err.to_string(), "sink failed to persist key `requests`: disk full");
//! assert_eq!(err.key(), Some("requests"));
//! ```

use thiserror::Error;

/// The error type returned by [`Sink`](crate::sink::Sink) implementations.
///
/// Sinks are external collaborators, so any error type is accepted as long as
/// it can cross threads.
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for counter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The sink rejected the value for `key`.
    ///
    /// The key keeps its accumulated value and is retried on the next flush.
    #[error("sink failed to persist key `{key}`: {source}")]
    Sink {
        /// The key whose value could not be persisted.
        key: String,
        /// The error returned by the sink.
        #[source]
        source: SinkError,
    },

    /// The window duration was zero.
    #[error("window duration must be greater than zero")]
    InvalidWindow,

    /// The shard count was zero.
    #[error("shard count must be greater than zero")]
    InvalidShards,

    /// The scheduler thread exited without reporting the final flush.
    #[error("scheduler loop terminated before completing shutdown")]
    LoopTerminated,

    /// The scheduler thread could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    /// Returns the key that failed to persist, if this is a sink error.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Sink { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Returns `true` if the error originated in the sink.
    pub fn is_sink(&self) -> bool {
        matches!(self, Error::Sink { .. })
    }
}

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_sink_error_display() {
        let err = Error::Sink {
            key: "hits".to_string(),
            source: "connection reset".into(),
        };
        assert_eq!(
            err.to_string(),
            "sink failed to persist key `hits`: connection reset"
        );
        assert!(err.is_sink());
        assert_eq!(err.key(), Some("hits"));
    }

    #[test]
    fn test_sink_error_source() {
        let err = Error::Sink {
            key: "hits".to_string(),
            source: "timeout".into(),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_non_sink_errors() {
        assert!(!Error::InvalidWindow.is_sink());
        assert_eq!(Error::InvalidShards.key(), None);
        assert_eq!(
            Error::LoopTerminated.to_string(),
            "scheduler loop terminated before completing shutdown"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads");
        let err: Error = io.into();
        assert!(matches!(err, Error::Spawn(_)));
        assert!(err.to_string().contains("no threads"));
    }
}
