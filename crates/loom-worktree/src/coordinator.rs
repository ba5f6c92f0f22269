//! `WorktreeCoordinator` — maps sessions to isolated working directories.
//!
//! Decides isolation policy (`shouldIsolate`), acquires/releases working
//! directories, applies auto-commit and merge-back strategies on release,
//! and recovers worktrees left behind by crashed sessions. The lease map
//! follows the same `DashMap` + `parking_lot::Mutex` ownership pattern used
//! by the subagent tracker: one owner per path, looked up by session id.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use loom_events::{AppendOptions, EventStore, EventType};
use loom_settings::{IsolationMode, WorktreeSettings};
use serde_json::json;
use tracing::{info, warn};

use crate::errors::{Result, WorktreeError};
use crate::executor::GitExecutor;
use crate::types::{
    AcquireOptions, ForkedFrom, MergeStrategy, OrphanRecoveryOutcome, ReleaseOptions,
    WorkingDirectory,
};

/// One session's lease on a working directory.
#[derive(Debug, Clone)]
struct Lease {
    path: String,
    branch: String,
    isolated: bool,
}

/// Coordinates worktree isolation across concurrently running sessions.
pub struct WorktreeCoordinator {
    executor: Arc<dyn GitExecutor>,
    event_store: Arc<EventStore>,
    settings: WorktreeSettings,
    leases: DashMap<String, Lease>,
}

impl WorktreeCoordinator {
    /// Create a coordinator backed by the given executor, event store, and
    /// worktree settings.
    pub fn new(
        executor: Arc<dyn GitExecutor>,
        event_store: Arc<EventStore>,
        settings: WorktreeSettings,
    ) -> Self {
        Self {
            executor,
            event_store,
            settings,
            leases: DashMap::new(),
        }
    }

    /// Number of active leases.
    pub fn active_lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Whether the given session currently holds a lease.
    pub fn has_lease(&self, session_id: &str) -> bool {
        self.leases.contains_key(session_id)
    }

    /// Decide whether a session should get an isolated worktree rather than
    /// operating directly on `working_dir`.
    fn should_isolate(&self, working_dir: &str, opts: &AcquireOptions) -> bool {
        if opts.force_isolation || opts.parent_session_id.is_some() {
            return true;
        }
        match self.settings.isolation_mode {
            IsolationMode::Always => true,
            IsolationMode::Never => false,
            IsolationMode::Lazy => self.leases.iter().any(|e| e.value().path == working_dir),
        }
    }

    /// Acquire a working directory lease for `session_id`.
    ///
    /// If `working_dir` is not a git repository, returns a non-isolated
    /// lease unconditionally. Otherwise applies [`should_isolate`] and, if
    /// isolating, creates a new worktree under `<repo>/.worktrees/<session_id>`
    /// on branch `<prefix><session_id>`.
    pub async fn acquire(
        &self,
        session_id: &str,
        working_dir: &str,
        opts: AcquireOptions,
    ) -> Result<WorkingDirectory> {
        if self.leases.contains_key(session_id) {
            return Err(WorktreeError::AlreadyLeased(session_id.to_string()));
        }

        if !self.executor.is_git_repo(working_dir).await {
            let wd = WorkingDirectory {
                path: working_dir.to_string(),
                branch: String::new(),
                base_commit: String::new(),
                isolated: false,
                forked_from: None,
            };
            self.leases.insert(
                session_id.to_string(),
                Lease {
                    path: wd.path.clone(),
                    branch: String::new(),
                    isolated: false,
                },
            );
            return Ok(wd);
        }

        if !self.should_isolate(working_dir, &opts) {
            let base_commit = self.executor.head_commit(working_dir).await?;
            let wd = WorkingDirectory {
                path: working_dir.to_string(),
                branch: String::new(),
                base_commit,
                isolated: false,
                forked_from: None,
            };
            self.leases.insert(
                session_id.to_string(),
                Lease {
                    path: wd.path.clone(),
                    branch: String::new(),
                    isolated: false,
                },
            );
            return Ok(wd);
        }

        let base_commit = if let Some(commit) = &opts.parent_commit {
            commit.clone()
        } else {
            self.executor.head_commit(working_dir).await?
        };

        let branch = format!("{}{}", self.settings.branch_prefix, session_id);
        let worktree_path =
            Path::new(working_dir).join(".worktrees").join(session_id);
        let worktree_path = worktree_path.to_string_lossy().to_string();

        self.executor
            .create_worktree(working_dir, &worktree_path, &branch, &base_commit)
            .await?;

        let forked_from = opts.parent_session_id.as_ref().map(|parent| ForkedFrom {
            session_id: parent.clone(),
            commit: base_commit.clone(),
        });

        self.leases.insert(
            session_id.to_string(),
            Lease {
                path: worktree_path.clone(),
                branch: branch.clone(),
                isolated: true,
            },
        );

        let payload = json!({
            "path": worktree_path,
            "branch": branch,
            "baseCommit": base_commit,
            "isolated": true,
            "forkedFrom": forked_from.as_ref().map(|f| json!({
                "sessionId": f.session_id,
                "commit": f.commit,
            })),
        });
        if let Err(e) = self.event_store.append(&AppendOptions {
            session_id,
            event_type: EventType::WorktreeAcquired,
            payload,
            parent_id: None,
        }) {
            warn!(error = %e, session_id, "failed to persist worktree.acquired");
        }

        info!(session_id, worktree_path, branch, "worktree acquired");

        Ok(WorkingDirectory {
            path: worktree_path,
            branch,
            base_commit,
            isolated: true,
            forked_from,
        })
    }

    /// Release `session_id`'s lease.
    ///
    /// Optionally auto-commits dirty changes, optionally merges into
    /// `opts.merge_target`, and removes the worktree unless configured to
    /// preserve it. If the directory vanished externally, only the internal
    /// lease is released.
    pub async fn release(&self, session_id: &str, opts: ReleaseOptions) -> Result<()> {
        let Some((_, lease)) = self.leases.remove(session_id) else {
            return Err(WorktreeError::NotLeased(session_id.to_string()));
        };

        if !lease.isolated {
            return Ok(());
        }

        if !Path::new(&lease.path).exists() {
            warn!(session_id, path = %lease.path, "worktree vanished externally, pruning lease only");
            return Ok(());
        }

        let mut final_commit = None;
        if self.settings.auto_commit_on_release {
            if self.executor.is_dirty(&lease.path).await? {
                let message = opts
                    .commit_message
                    .clone()
                    .unwrap_or_else(|| format!("Auto-commit on release for session {session_id}"));
                final_commit = self.executor.commit_all(&lease.path, &message).await?;
                if let Some(commit_hash) = &final_commit {
                    self.emit_best_effort(
                        session_id,
                        EventType::WorktreeCommit,
                        json!({
                            "commitHash": commit_hash,
                            "message": message,
                            "filesChanged": [],
                        }),
                    );
                }
            }
        }

        if let Some(target) = &opts.merge_target {
            let outcome = self
                .executor
                .merge(target, &lease.branch, opts.merge_strategy)
                .await?;
            if outcome.conflicts {
                // Re-insert the lease; the caller must resolve before retrying release.
                self.leases.insert(session_id.to_string(), lease.clone());
                return Err(WorktreeError::MergeConflict {
                    source: lease.branch.clone(),
                    target: target.clone(),
                });
            }
            if let Some(commit_hash) = &outcome.commit_hash {
                self.emit_best_effort(
                    session_id,
                    EventType::WorktreeMerged,
                    json!({
                        "sourceBranch": lease.branch,
                        "targetBranch": target,
                        "mergeCommit": commit_hash,
                        "strategy": format!("{:?}", opts.merge_strategy).to_lowercase(),
                    }),
                );
            }
        }

        let deleted = self.settings.delete_worktree_on_release;
        if deleted {
            self.executor
                .remove_worktree(&repo_root_of(&lease.path), &lease.path, false)
                .await?;
        }

        if !self.settings.preserve_branches && deleted {
            let _ = self
                .executor
                .delete_branch(&repo_root_of(&lease.path), &lease.branch, false)
                .await;
        }

        self.emit_best_effort(
            session_id,
            EventType::WorktreeReleased,
            json!({
                "finalCommit": final_commit,
                "deleted": deleted,
                "branchPreserved": self.settings.preserve_branches || !deleted,
            }),
        );

        Ok(())
    }

    /// Scan known worktrees and reclaim any not owned by an active session.
    ///
    /// Attempts to commit dirty trees before deleting, per policy. Event
    /// emission for recovered worktrees is best-effort.
    pub async fn recover_orphaned_worktrees(
        &self,
        repo_root: &str,
    ) -> Result<Vec<OrphanRecoveryOutcome>> {
        let known = self.executor.list_worktrees(repo_root).await?;
        let owned: std::collections::HashSet<String> =
            self.leases.iter().map(|e| e.value().path.clone()).collect();

        let mut outcomes = Vec::new();
        for path in known {
            if owned.contains(&path) {
                continue;
            }

            let mut committed = false;
            if self.settings.auto_commit_on_release {
                if let Ok(true) = self.executor.is_dirty(&path).await {
                    if self
                        .executor
                        .commit_all(&path, "Recovered orphaned worktree")
                        .await
                        .unwrap_or(None)
                        .is_some()
                    {
                        committed = true;
                    }
                }
            }

            let deleted = if self.settings.delete_worktree_on_release {
                self.executor
                    .remove_worktree(repo_root, &path, true)
                    .await
                    .is_ok()
            } else {
                false
            };

            outcomes.push(OrphanRecoveryOutcome {
                path,
                committed,
                deleted,
            });
        }

        Ok(outcomes)
    }

    fn emit_best_effort(&self, session_id: &str, event_type: EventType, payload: serde_json::Value) {
        if let Err(e) = self.event_store.append(&AppendOptions {
            session_id,
            event_type,
            payload,
            parent_id: None,
        }) {
            warn!(error = %e, session_id, ?event_type, "failed to persist worktree event");
        }
    }
}

/// `<repo>/.worktrees/<session>` → `<repo>`.
fn repo_root_of(worktree_path: &str) -> String {
    Path::new(worktree_path)
        .parent()
        .and_then(Path::parent)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| worktree_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeGitExecutor, FakeGitScript, MergeOutcome};

    fn make_store() -> Arc<EventStore> {
        let pool = loom_events::new_in_memory(&loom_events::ConnectionConfig::default()).unwrap();
        Arc::new(EventStore::new(pool))
    }

    fn make_coordinator(
        script: FakeGitScript,
        isolation_mode: IsolationMode,
    ) -> (Arc<FakeGitExecutor>, WorktreeCoordinator) {
        let executor = Arc::new(FakeGitExecutor::new(script));
        let store = make_store();
        let settings = WorktreeSettings {
            isolation_mode,
            ..Default::default()
        };
        let coordinator =
            WorktreeCoordinator::new(executor.clone(), store, settings);
        (executor, coordinator)
    }

    #[tokio::test]
    async fn acquire_non_repo_is_not_isolated() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: false,
                ..Default::default()
            },
            IsolationMode::Always,
        );

        let wd = coord
            .acquire("s1", "/tmp/not-a-repo", AcquireOptions::default())
            .await
            .unwrap();
        assert!(!wd.isolated);
    }

    #[tokio::test]
    async fn acquire_never_mode_stays_unisolated() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "abc123".into(),
                ..Default::default()
            },
            IsolationMode::Never,
        );

        let wd = coord
            .acquire("s1", "/repo", AcquireOptions::default())
            .await
            .unwrap();
        assert!(!wd.isolated);
        assert_eq!(wd.base_commit, "abc123");
    }

    #[tokio::test]
    async fn acquire_always_mode_isolates() {
        let (exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "abc123".into(),
                ..Default::default()
            },
            IsolationMode::Always,
        );

        let wd = coord
            .acquire("s1", "/repo", AcquireOptions::default())
            .await
            .unwrap();
        assert!(wd.isolated);
        assert!(wd.path.contains(".worktrees/s1"));
        assert_eq!(wd.branch, "session/s1");
        assert!(exec.calls.lock().iter().any(|c| c.starts_with("create_worktree")));
    }

    #[tokio::test]
    async fn acquire_fork_isolates_with_parent() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "main-head".into(),
                ..Default::default()
            },
            IsolationMode::Lazy,
        );

        let opts = AcquireOptions {
            parent_session_id: Some("parent".into()),
            parent_commit: Some("parent-commit".into()),
            ..Default::default()
        };
        let wd = coord.acquire("child", "/repo", opts).await.unwrap();
        assert!(wd.isolated);
        assert_eq!(wd.base_commit, "parent-commit");
        assert_eq!(
            wd.forked_from,
            Some(ForkedFrom {
                session_id: "parent".into(),
                commit: "parent-commit".into(),
            })
        );
    }

    #[tokio::test]
    async fn acquire_twice_for_same_session_errors() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: false,
                ..Default::default()
            },
            IsolationMode::Never,
        );

        coord.acquire("s1", "/tmp/x", AcquireOptions::default()).await.unwrap();
        let err = coord
            .acquire("s1", "/tmp/x", AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::AlreadyLeased(_)));
    }

    #[tokio::test]
    async fn release_unknown_session_errors() {
        let (_exec, coord) = make_coordinator(FakeGitScript::default(), IsolationMode::Never);
        let err = coord
            .release("ghost", ReleaseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::NotLeased(_)));
    }

    #[tokio::test]
    async fn release_merge_conflict_restores_lease() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "abc".into(),
                dirty: false,
                merge_result: Some(MergeOutcome {
                    merged: false,
                    conflicts: true,
                    commit_hash: None,
                }),
                ..Default::default()
            },
            IsolationMode::Always,
        );

        coord.acquire("s1", "/repo", AcquireOptions::default()).await.unwrap();
        assert!(coord.has_lease("s1"));

        let opts = ReleaseOptions {
            merge_target: Some("main".into()),
            ..Default::default()
        };
        let err = coord.release("s1", opts).await.unwrap_err();
        assert!(matches!(err, WorktreeError::MergeConflict { .. }));
        assert!(coord.has_lease("s1"), "lease must survive a conflicted release");
    }

    #[tokio::test]
    async fn lazy_mode_isolates_when_main_already_owned() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "abc".into(),
                ..Default::default()
            },
            IsolationMode::Lazy,
        );

        // First session takes the main (non-isolated) directory.
        let wd1 = coord.acquire("s1", "/repo", AcquireOptions::default()).await.unwrap();
        assert!(!wd1.isolated);

        // Second session on the same dir must isolate.
        let wd2 = coord.acquire("s2", "/repo", AcquireOptions::default()).await.unwrap();
        assert!(wd2.isolated);
    }

    #[tokio::test]
    async fn recover_orphans_skips_owned_worktrees() {
        let (_exec, coord) = make_coordinator(
            FakeGitScript {
                is_repo: true,
                head_commit: "abc".into(),
                worktrees: vec!["/repo/.worktrees/owned".into(), "/repo/.worktrees/orphan".into()],
                dirty: false,
                ..Default::default()
            },
            IsolationMode::Always,
        );

        coord.leases.insert(
            "owner".to_string(),
            Lease {
                path: "/repo/.worktrees/owned".to_string(),
                branch: "session/owner".to_string(),
                isolated: true,
            },
        );

        let outcomes = coord.recover_orphaned_worktrees("/repo").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].path, "/repo/.worktrees/orphan");
    }
}
