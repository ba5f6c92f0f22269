//! # loom-logging
//!
//! Structured logging with `tracing` and optional `SQLite` transport.
//!
//! Provides per-module spans, request/session ID propagation,
//! and batched async writes to the log database.

#![deny(unsafe_code)]

pub mod transport;
pub mod types;

use rusqlite::Connection;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use transport::{SqliteTransport, TransportConfig, TransportHandle};
pub use types::{LogEntry, LogLevel, LogQueryOptions};

/// Initialize the global `tracing` subscriber with stdout formatting plus a
/// `SqliteTransport` layer writing to `conn`. Returns a [`TransportHandle`]
/// for manual flushing (e.g. before process exit).
///
/// Respects `RUST_LOG` via [`EnvFilter`], defaulting to `info`.
pub fn init_subscriber_with_sqlite(conn: Connection, config: TransportConfig) -> TransportHandle {
    let transport = SqliteTransport::new(conn, config);
    let handle = transport.handle();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(transport)
        .try_init();

    handle
}

/// Spawn a background task that flushes `handle` every `interval_ms` milliseconds
/// until the returned `JoinHandle` is aborted or the process exits.
pub fn spawn_flush_task(handle: TransportHandle, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            handle.flush();
        }
    })
}
