//! Worktree error types.

use thiserror::Error;

/// Errors that can occur during worktree acquisition, release, or recovery.
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// A git command exited non-zero.
    #[error("git {command} failed: {stderr}")]
    GitCommandFailed {
        /// The git subcommand that was run (e.g. "worktree add").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Failed to spawn the git process itself.
    #[error("failed to spawn git: {0}")]
    Spawn(String),

    /// The requested session already owns a lease.
    #[error("session '{0}' already holds a worktree lease")]
    AlreadyLeased(String),

    /// No lease exists for the given session.
    #[error("no worktree lease for session '{0}'")]
    NotLeased(String),

    /// A merge produced conflicts.
    #[error("merge of '{source}' into '{target}' conflicted")]
    MergeConflict {
        /// Source branch.
        source: String,
        /// Target branch.
        target: String,
    },

    /// Event persistence failed (best-effort, never fatal to the caller).
    #[error("failed to persist worktree event: {0}")]
    EventPersistence(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, WorktreeError>;
