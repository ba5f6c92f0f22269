//! Task error types.
//!
//! All errors are structured with typed variants for each failure mode.
//! Unlike memory errors, task errors are **not** fail-silent — callers
//! should handle them (typically returning RPC errors to the client).

use thiserror::Error;

/// Errors from task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity type (e.g., "Task", "Project", "Area").
        entity: &'static str,
        /// The ID that was looked up.
        id: String,
    },

    /// Validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Circular dependency detected.
    #[error("Circular dependency: {blocker_id} → {blocked_id}")]
    CircularDependency {
        /// The task that would block.
        blocker_id: String,
        /// The task that would be blocked.
        blocked_id: String,
    },

    /// Hierarchy violation (e.g., subtask of subtask).
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TaskError {
    /// Create a not-found error for a task.
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Task",
            id: id.into(),
        }
    }

    /// Create a not-found error for a project.
    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Project",
            id: id.into(),
        }
    }

    /// Create a not-found error for an area.
    pub fn area_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Area",
            id: id.into(),
        }
    }
}
