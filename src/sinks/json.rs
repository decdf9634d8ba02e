//! JSON lines sink.
//!
//! This module provides [`JsonLinesSink`], which serializes every persisted
//! window total as one JSON object per line using serde.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! finestra = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use finestra::sink::{Sink, WriteContext};
//! use finestra::sinks::json::JsonLinesSink;
//! use std::time::{Duration, SystemTime};
//!
//! let sink = JsonLinesSink::new(Vec::new());
//! let window = SystemTime::UNIX_EPOCH + Duration::from_millis(1_500);
//! sink.write(&WriteContext::new(2, None), "requests", 42, window).unwrap();
//!
//! let out = String::from_utf8(sink.into_inner()).unwrap();
//! assert_eq!(out, "{\"key\":\"requests\",\"value\":42,\"window_ms\":1500,\"window_index\":2}\n");
//! ```

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::sink::{Sink, WriteContext};

/// One persisted window total, as written to the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowEntry {
    /// The counter key.
    pub key: String,
    /// The total accumulated during the window.
    pub value: u64,
    /// The window's nominal timestamp in milliseconds since the Unix epoch.
    pub window_ms: u64,
    /// The window's sequence number.
    pub window_index: u64,
}

impl WindowEntry {
    /// Builds an entry from the arguments of a sink call.
    pub fn new(ctx: &WriteContext, key: &str, value: u64, window: SystemTime) -> Self {
        Self {
            key: key.to_owned(),
            value,
            window_ms: timestamp_ms(window),
            window_index: ctx.window_index(),
        }
    }
}

/// A sink writing newline-delimited JSON to `W`.
///
/// Every write is flushed to `W` before returning so that an accepted value
/// has reached the writer by the time the counter resets the key.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Creates a sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn write(
        &self,
        ctx: &WriteContext,
        key: &str,
        value: u64,
        window: SystemTime,
    ) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&WindowEntry::new(ctx, key, value, window))?;
        line.push(b'\n');

        let mut out = self.out.lock();
        out.write_all(&line)?;
        out.flush()?;
        Ok(())
    }
}

/// Milliseconds since the Unix epoch, or 0 for times before it.
fn timestamp_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
