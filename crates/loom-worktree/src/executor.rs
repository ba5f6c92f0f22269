//! `GitExecutor` — git plumbing abstracted behind a small executor contract.
//!
//! [`WorktreeCoordinator`](crate::coordinator::WorktreeCoordinator) drives all
//! decision logic (isolation policy, lease ownership, merge strategy selection)
//! against this trait, so it is unit-testable without a real git binary.

use async_trait::async_trait;

use crate::errors::{Result, WorktreeError};
use crate::types::MergeStrategy;

/// Outcome of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Whether the merge completed without conflicts.
    pub merged: bool,
    /// Whether conflicts were detected.
    pub conflicts: bool,
    /// Resulting commit hash, if merged.
    pub commit_hash: Option<String>,
}

/// Git operations needed by the worktree coordinator.
///
/// One real implementation shells out to the system `git` binary via
/// `tokio::process::Command`; a fake implementation records calls and
/// returns scripted results for tests.
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Whether `dir` is inside a git working tree at all.
    async fn is_git_repo(&self, dir: &str) -> bool;

    /// Current HEAD commit hash of `dir`.
    async fn head_commit(&self, dir: &str) -> Result<String>;

    /// Whether `dir` has uncommitted changes (tracked or untracked).
    async fn is_dirty(&self, dir: &str) -> Result<bool>;

    /// Create a worktree at `worktree_path` on a new `branch`, based on
    /// `base_commit`.
    async fn create_worktree(
        &self,
        repo_root: &str,
        worktree_path: &str,
        branch: &str,
        base_commit: &str,
    ) -> Result<()>;

    /// Remove a worktree. `force` discards uncommitted changes in it.
    async fn remove_worktree(&self, repo_root: &str, worktree_path: &str, force: bool)
        -> Result<()>;

    /// List all worktree paths known to `repo_root` (excludes the main tree).
    async fn list_worktrees(&self, repo_root: &str) -> Result<Vec<String>>;

    /// Stage all changes and commit with `message`. Returns `None` if there
    /// was nothing to commit.
    async fn commit_all(&self, dir: &str, message: &str) -> Result<Option<String>>;

    /// Merge `source_branch` into the branch currently checked out at `dir`,
    /// using `strategy`.
    async fn merge(
        &self,
        dir: &str,
        source_branch: &str,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome>;

    /// Delete a local branch. `force` allows deleting unmerged branches.
    async fn delete_branch(&self, repo_root: &str, branch: &str, force: bool) -> Result<()>;
}

/// Real [`GitExecutor`] backed by the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct RealGitExecutor;

impl RealGitExecutor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, dir: &str, args: &[&str]) -> Result<std::process::Output> {
        tokio::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .await
            .map_err(|e| WorktreeError::Spawn(e.to_string()))
    }

    fn ensure_success(command: &str, output: &std::process::Output) -> Result<()> {
        if output.status.success() {
            Ok(())
        } else {
            Err(WorktreeError::GitCommandFailed {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl GitExecutor for RealGitExecutor {
    async fn is_git_repo(&self, dir: &str) -> bool {
        self.run(dir, &["rev-parse", "--is-inside-work-tree"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn head_commit(&self, dir: &str) -> Result<String> {
        let output = self.run(dir, &["rev-parse", "HEAD"]).await?;
        Self::ensure_success("rev-parse HEAD", &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn is_dirty(&self, dir: &str) -> Result<bool> {
        let output = self.run(dir, &["status", "--porcelain"]).await?;
        Self::ensure_success("status --porcelain", &output)?;
        Ok(!output.stdout.is_empty())
    }

    async fn create_worktree(
        &self,
        repo_root: &str,
        worktree_path: &str,
        branch: &str,
        base_commit: &str,
    ) -> Result<()> {
        let output = self
            .run(
                repo_root,
                &["worktree", "add", "-b", branch, worktree_path, base_commit],
            )
            .await?;
        Self::ensure_success("worktree add", &output)
    }

    async fn remove_worktree(
        &self,
        repo_root: &str,
        worktree_path: &str,
        force: bool,
    ) -> Result<()> {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(worktree_path);
        let output = self.run(repo_root, &args).await?;
        Self::ensure_success("worktree remove", &output)
    }

    async fn list_worktrees(&self, repo_root: &str) -> Result<Vec<String>> {
        let output = self
            .run(repo_root, &["worktree", "list", "--porcelain"])
            .await?;
        Self::ensure_success("worktree list", &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let main_root = std::path::Path::new(repo_root);
        let paths: Vec<String> = stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(str::to_string)
            .filter(|p| std::path::Path::new(p) != main_root)
            .collect();
        Ok(paths)
    }

    async fn commit_all(&self, dir: &str, message: &str) -> Result<Option<String>> {
        let add = self.run(dir, &["add", "-A"]).await?;
        Self::ensure_success("add -A", &add)?;

        let commit = self.run(dir, &["commit", "-m", message]).await?;
        if !commit.status.success() {
            let stdout = String::from_utf8_lossy(&commit.stdout);
            let stderr = String::from_utf8_lossy(&commit.stderr);
            if stdout.contains("nothing to commit") || stderr.contains("nothing to commit") {
                return Ok(None);
            }
            return Err(WorktreeError::GitCommandFailed {
                command: "commit".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        self.head_commit(dir).await.map(Some)
    }

    async fn merge(
        &self,
        dir: &str,
        source_branch: &str,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome> {
        let args: Vec<&str> = match strategy {
            MergeStrategy::Merge => vec!["merge", source_branch, "--no-edit"],
            MergeStrategy::Squash => vec!["merge", "--squash", source_branch],
            MergeStrategy::Rebase => vec!["rebase", source_branch],
        };
        let output = self.run(dir, &args).await?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains("CONFLICT") || stderr.contains("CONFLICT") {
                return Ok(MergeOutcome {
                    merged: false,
                    conflicts: true,
                    commit_hash: None,
                });
            }
            return Err(WorktreeError::GitCommandFailed {
                command: "merge".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        // A squash merge leaves the changes staged but uncommitted.
        if matches!(strategy, MergeStrategy::Squash) {
            return self.commit_all(dir, &format!("Squash merge {source_branch}")).await.map(
                |commit_hash| MergeOutcome {
                    merged: true,
                    conflicts: false,
                    commit_hash,
                },
            );
        }

        let commit_hash = self.head_commit(dir).await.ok();
        Ok(MergeOutcome {
            merged: true,
            conflicts: false,
            commit_hash,
        })
    }

    async fn delete_branch(&self, repo_root: &str, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        let output = self.run(repo_root, &["branch", flag, branch]).await?;
        Self::ensure_success("branch -d", &output)
    }
}

/// Scripted responses for [`FakeGitExecutor`], keyed by call kind.
#[derive(Debug, Clone, Default)]
pub struct FakeGitScript {
    /// Commit hash returned by `head_commit` and used as the base for new worktrees.
    pub head_commit: String,
    /// Whether `is_git_repo` reports true.
    pub is_repo: bool,
    /// Whether `is_dirty` reports true.
    pub dirty: bool,
    /// Commit hash `commit_all` returns, or `None` to simulate "nothing to commit".
    pub commit_result: Option<String>,
    /// Outcome `merge` returns.
    pub merge_result: Option<MergeOutcome>,
    /// Worktrees `list_worktrees` returns.
    pub worktrees: Vec<String>,
}

/// In-memory [`GitExecutor`] that records every call and returns scripted
/// results, so coordinator decision logic is testable without a real `git`
/// binary or filesystem.
#[derive(Debug, Default)]
pub struct FakeGitExecutor {
    /// Method names invoked, in call order, e.g. `"create_worktree(wt1, sess1)"`.
    pub calls: parking_lot::Mutex<Vec<String>>,
    /// Scripted responses.
    pub script: parking_lot::Mutex<FakeGitScript>,
}

impl FakeGitExecutor {
    /// Create a fake with the given scripted responses.
    pub fn new(script: FakeGitScript) -> Self {
        Self {
            calls: parking_lot::Mutex::new(Vec::new()),
            script: parking_lot::Mutex::new(script),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl GitExecutor for FakeGitExecutor {
    async fn is_git_repo(&self, dir: &str) -> bool {
        self.record(format!("is_git_repo({dir})"));
        self.script.lock().is_repo
    }

    async fn head_commit(&self, dir: &str) -> Result<String> {
        self.record(format!("head_commit({dir})"));
        Ok(self.script.lock().head_commit.clone())
    }

    async fn is_dirty(&self, dir: &str) -> Result<bool> {
        self.record(format!("is_dirty({dir})"));
        Ok(self.script.lock().dirty)
    }

    async fn create_worktree(
        &self,
        repo_root: &str,
        worktree_path: &str,
        branch: &str,
        base_commit: &str,
    ) -> Result<()> {
        self.record(format!(
            "create_worktree({repo_root}, {worktree_path}, {branch}, {base_commit})"
        ));
        Ok(())
    }

    async fn remove_worktree(
        &self,
        repo_root: &str,
        worktree_path: &str,
        force: bool,
    ) -> Result<()> {
        self.record(format!("remove_worktree({repo_root}, {worktree_path}, {force})"));
        Ok(())
    }

    async fn list_worktrees(&self, repo_root: &str) -> Result<Vec<String>> {
        self.record(format!("list_worktrees({repo_root})"));
        Ok(self.script.lock().worktrees.clone())
    }

    async fn commit_all(&self, dir: &str, message: &str) -> Result<Option<String>> {
        self.record(format!("commit_all({dir}, {message})"));
        Ok(self.script.lock().commit_result.clone())
    }

    async fn merge(
        &self,
        dir: &str,
        source_branch: &str,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome> {
        self.record(format!("merge({dir}, {source_branch}, {strategy:?})"));
        Ok(self.script.lock().merge_result.clone().unwrap_or(MergeOutcome {
            merged: true,
            conflicts: false,
            commit_hash: Some("merged-commit".to_string()),
        }))
    }

    async fn delete_branch(&self, repo_root: &str, branch: &str, force: bool) -> Result<()> {
        self.record(format!("delete_branch({repo_root}, {branch}, {force})"));
        Ok(())
    }
}
