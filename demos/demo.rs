//! Demo application running a live windowed counter.
//!
//! Run with:
//! ```bash
//! cargo run --example demo --features demo -- --help
//! ```

use clap::{Parser, ValueEnum};
use finestra::config::ClosePolicy;
use finestra::sinks::json::JsonLinesSink;
use finestra::sinks::MemorySink;
use finestra::{FlushOrder, Sink, TracingLogger, WindowedCounter};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Where flushed windows go.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkChoice {
    /// One JSON object per line on stdout
    Json,
    /// Keep in memory and print a summary at the end
    Memory,
}

/// Demo application for finestra - windowed counters flushed to a sink.
///
/// This demo starts a counter, hammers it from several threads for a while,
/// and shows every window as it is flushed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sink to flush windows to
    #[arg(short, long, value_enum, default_value = "json")]
    sink: SinkChoice,

    /// Window length in milliseconds
    #[arg(short, long, default_value = "500")]
    window: u64,

    /// Total run time in milliseconds
    #[arg(short, long, default_value = "2000")]
    duration: u64,

    /// Number of incrementing threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Number of table shards
    #[arg(long, default_value = "16")]
    shards: usize,

    /// Flush keys in sorted order
    #[arg(long)]
    sorted: bool,

    /// Make the memory sink reject this key (shows retention on failure)
    #[arg(long)]
    fail_key: Option<String>,

    /// Return the final flush error from close
    #[arg(long)]
    propagate: bool,
}

const KEYS: [&str; 4] = ["http_requests", "http_errors", "cache_hits", "cache_misses"];

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_thread_names(true))
        .init();
}

fn simulate_traffic(counter: &WindowedCounter, threads: usize, run_for: Duration) {
    let deadline = Instant::now() + run_for;
    thread::scope(|s| {
        for t in 0..threads {
            s.spawn(move || {
                let mut i = 0usize;
                while Instant::now() < deadline {
                    let key = KEYS[(t + i) % KEYS.len()];
                    counter.increment(key, 1);
                    i += 1;
                    if i % 1000 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            });
        }
    });
}

fn main() {
    let args = Args::parse();
    init_logging();

    let memory = Arc::new(MemorySink::new());
    if let Some(key) = &args.fail_key {
        memory.fail_key(key.clone());
    }
    let sink: Arc<dyn Sink> = match args.sink {
        SinkChoice::Json => Arc::new(JsonLinesSink::new(io::stdout())),
        SinkChoice::Memory => memory.clone(),
    };

    let counter = WindowedCounter::builder(Duration::from_millis(args.window), sink)
        .shards(args.shards)
        .flush_order(if args.sorted {
            FlushOrder::Sorted
        } else {
            FlushOrder::Arbitrary
        })
        .close_policy(if args.propagate {
            ClosePolicy::Propagate
        } else {
            ClosePolicy::AlwaysOk
        })
        .logger(Arc::new(TracingLogger::new()))
        .start();

    let counter = match counter {
        Ok(counter) => counter,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        window_ms = args.window,
        threads = args.threads,
        shards = args.shards,
        "counter started"
    );
    simulate_traffic(&counter, args.threads, Duration::from_millis(args.duration));

    let pending = counter.pending();
    tracing::info!(keys = pending.len(), "closing");

    if let Err(err) = counter.close() {
        eprintln!("final flush failed: {err}");
        std::process::exit(1);
    }

    if let SinkChoice::Memory = args.sink {
        println!("{:<16} {:>8} {:>12}", "key", "windows", "total");
        for key in KEYS {
            let windows = memory.records().iter().filter(|r| r.key == key).count();
            println!("{:<16} {:>8} {:>12}", key, windows, memory.total(key));
        }
    }
}
