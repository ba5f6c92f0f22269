//! # loom-worktree
//!
//! Maps sessions to isolated git worktrees: decides isolation policy,
//! acquires/releases working directories, auto-commits and merges back on
//! release, and recovers worktrees orphaned by crashed sessions.
//!
//! Git plumbing is abstracted behind the [`executor::GitExecutor`] trait so
//! the coordinator's decision logic is testable without a real `git` binary.

#![deny(unsafe_code)]

pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod types;

pub use coordinator::WorktreeCoordinator;
pub use errors::WorktreeError;
pub use executor::{FakeGitExecutor, FakeGitScript, GitExecutor, MergeOutcome, RealGitExecutor};
pub use types::{
    AcquireOptions, ForkedFrom, MergeStrategy, OrphanRecoveryOutcome, ReleaseOptions,
    WorkingDirectory,
};
