//! Integration tests exercising `WorktreeCoordinator` through its public API.

use std::sync::Arc;

use loom_events::sqlite::repositories::event::ListEventsOptions;
use loom_events::{ConnectionConfig, EventStore, new_in_memory};
use loom_settings::{IsolationMode, WorktreeSettings};
use loom_worktree::{AcquireOptions, FakeGitExecutor, FakeGitScript, WorktreeCoordinator};

fn make_store() -> Arc<EventStore> {
    let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
    Arc::new(EventStore::new(pool))
}

#[tokio::test]
async fn acquire_persists_worktree_acquired_event() {
    let store = make_store();

    let executor = Arc::new(FakeGitExecutor::new(FakeGitScript {
        is_repo: true,
        head_commit: "base-commit".into(),
        ..Default::default()
    }));
    let coordinator = WorktreeCoordinator::new(
        executor,
        store.clone(),
        WorktreeSettings {
            isolation_mode: IsolationMode::Always,
            ..Default::default()
        },
    );

    let sid = store.create_session("model", "/repo", None).unwrap().session.id;
    let wd = coordinator
        .acquire(&sid, "/repo", AcquireOptions::default())
        .await
        .unwrap();
    assert!(wd.isolated);

    let events = store
        .get_events_by_session(&sid, &ListEventsOptions::default())
        .unwrap();
    let acquired: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "worktree.acquired")
        .collect();
    assert_eq!(acquired.len(), 1);
}

#[tokio::test]
async fn release_without_lease_errors() {
    let store = make_store();
    let executor = Arc::new(FakeGitExecutor::new(FakeGitScript::default()));
    let coordinator =
        WorktreeCoordinator::new(executor, store, WorktreeSettings::default());

    let err = coordinator
        .release("unknown-session", Default::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no worktree lease for session 'unknown-session'");
}
