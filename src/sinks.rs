//! Ready-made [`Sink`](crate::sink::Sink) implementations.
//!
//! | Sink | Feature | Description |
//! |------|---------|-------------|
//! | [`MemorySink`] | - | Records writes in memory, with failure injection |
//! | [`json::JsonLinesSink`] | `json` | Writes one JSON object per line to any `io::Write` |
//!
//! # Example
//!
//! ```rust
//! use finestra::sinks::MemorySink;
//! use finestra::WindowedCounter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sink = Arc::new(MemorySink::new());
//! let counter = WindowedCounter::new(Duration::from_secs(60), Arc::clone(&sink));
//! counter.increment("requests", 3);
//! counter.close().unwrap();
//!
//! assert_eq!(sink.total("requests"), 3);
//! ```

mod memory;

pub use memory::{MemorySink, Record};

#[cfg(feature = "json")]
pub mod json;
