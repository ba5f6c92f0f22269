//! Worktree isolation settings.
//!
//! Controls when the runtime isolates a session into its own git worktree,
//! branch naming, and what happens to the worktree/branch on release.

use serde::{Deserialize, Serialize};

/// When to isolate a session into its own worktree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Never isolate; all sessions share the main working directory.
    Never,
    /// Isolate only when forced, forked, or the main directory is busy.
    Lazy,
    /// Always isolate into a new worktree.
    Always,
}

impl Default for IsolationMode {
    fn default() -> Self {
        Self::Lazy
    }
}

/// Worktree isolation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorktreeSettings {
    /// When to isolate a session into its own worktree.
    pub isolation_mode: IsolationMode,
    /// Prefix prepended to the session ID when naming the branch.
    pub branch_prefix: String,
    /// Whether to auto-commit uncommitted changes on release.
    pub auto_commit_on_release: bool,
    /// Whether to keep the session branch after the worktree is removed.
    pub preserve_branches: bool,
    /// Whether to remove the worktree directory on release.
    pub delete_worktree_on_release: bool,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            isolation_mode: IsolationMode::default(),
            branch_prefix: "session/".to_string(),
            auto_commit_on_release: true,
            preserve_branches: false,
            delete_worktree_on_release: true,
        }
    }
}
