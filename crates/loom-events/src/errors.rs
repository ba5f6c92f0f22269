//! Error types for the event store subsystem.
//!
//! [`EventStoreError`] is the primary error type returned by all event store
//! operations. It provides specific variants for common failure modes while
//! keeping the surface area small enough for exhaustive pattern matching.

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Requested event was not found.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Requested workspace was not found.
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// Requested blob was not found.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// A caller-supplied `parent_id` does not refer to any known event.
    #[error("parent event not found: {0}")]
    ParentNotFound(String),

    /// A caller-supplied `parent_id` refers to an event in a different session.
    #[error("parent event '{parent_id}' does not belong to session '{session_id}'")]
    ParentMismatch {
        /// The parent event ID that was supplied.
        parent_id: String,
        /// The session the append was targeting.
        session_id: String,
    },

    /// Invalid operation on the event store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
