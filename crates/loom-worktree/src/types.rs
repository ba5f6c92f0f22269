//! Core types for worktree isolation and leasing.

use serde::{Deserialize, Serialize};

/// How a worktree merges back into its target branch on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// `git merge --no-ff`.
    Merge,
    /// `git rebase` onto target, then fast-forward.
    Rebase,
    /// `git merge --squash`.
    Squash,
}

/// The commit a worktree was forked from, for audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkedFrom {
    /// Parent session ID.
    pub session_id: String,
    /// Commit the fork branched from.
    pub commit: String,
}

/// A leased working directory, isolated or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    /// Absolute path to the working directory (worktree path if isolated,
    /// the original path otherwise).
    pub path: String,
    /// Branch checked out in this directory.
    pub branch: String,
    /// Base commit the branch was created from.
    pub base_commit: String,
    /// Whether this directory is an isolated git worktree.
    pub isolated: bool,
    /// Fork source, if this lease was created via `parent_session_id`.
    pub forked_from: Option<ForkedFrom>,
}

/// Options controlling [`acquire`](crate::coordinator::WorktreeCoordinator::acquire).
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Force isolation regardless of the configured mode.
    pub force_isolation: bool,
    /// Parent session this lease forks from, if any.
    pub parent_session_id: Option<String>,
    /// Explicit base commit to branch from (overrides parent HEAD).
    pub parent_commit: Option<String>,
}

/// Options controlling [`release`](crate::coordinator::WorktreeCoordinator::release).
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    /// Commit message to use if auto-commit is enabled and the tree is dirty.
    pub commit_message: Option<String>,
    /// Branch to merge into, if any.
    pub merge_target: Option<String>,
    /// Merge strategy to use when `merge_target` is set.
    pub merge_strategy: MergeStrategy,
}

/// Outcome of a single orphan recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRecoveryOutcome {
    /// Worktree path that was recovered.
    pub path: String,
    /// Whether uncommitted changes were committed before cleanup.
    pub committed: bool,
    /// Whether the worktree directory was deleted.
    pub deleted: bool,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Merge
    }
}
