//! Orchestrator — multi-session coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use loom_core::events::LoomEvent;

use crate::agent::event_emitter::EventEmitter;
use crate::errors::RuntimeError;
use crate::orchestrator::session_manager::{SessionFilter, SessionManager};
use crate::orchestrator::tool_call_tracker::ToolCallTracker;

/// Tracks an active agent run within a session.
struct ActiveRun {
    run_id: String,
    cancel: CancellationToken,
}

/// Multi-session orchestrator.
pub struct Orchestrator {
    session_manager: Arc<SessionManager>,
    broadcast: Arc<EventEmitter>,
    max_concurrent_sessions: usize,
    /// Active runs keyed by `session_id`.
    active_runs: Mutex<HashMap<String, ActiveRun>>,
    /// Tool call tracker shared with RPC handlers.
    tool_tracker: Mutex<ToolCallTracker>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(session_manager: Arc<SessionManager>, max_concurrent: usize) -> Self {
        Self {
            session_manager,
            broadcast: Arc::new(EventEmitter::new()),
            max_concurrent_sessions: max_concurrent,
            active_runs: Mutex::new(HashMap::new()),
            tool_tracker: Mutex::new(ToolCallTracker::new()),
        }
    }

    /// Get the session manager.
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    /// Get the broadcast emitter.
    pub fn broadcast(&self) -> &Arc<EventEmitter> {
        &self.broadcast
    }

    /// Subscribe to all orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<LoomEvent> {
        self.broadcast.subscribe()
    }

    /// Start tracking a run for a session. Returns the `CancellationToken`.
    /// Errors if the session already has an active run.
    pub fn start_run(
        &self,
        session_id: &str,
        run_id: &str,
    ) -> Result<CancellationToken, RuntimeError> {
        let mut runs = self.active_runs.lock();
        if runs.contains_key(session_id) {
            return Err(RuntimeError::SessionBusy(session_id.to_string()));
        }
        let cancel = CancellationToken::new();
        runs.insert(
            session_id.to_string(),
            ActiveRun {
                run_id: run_id.to_string(),
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    /// Complete a run for a session (removes from active tracking).
    pub fn complete_run(&self, session_id: &str) {
        self.active_runs.lock().remove(session_id);
    }

    /// Get the run ID for an active session (if any).
    pub fn get_run_id(&self, session_id: &str) -> Option<String> {
        self.active_runs
            .lock()
            .get(session_id)
            .map(|r| r.run_id.clone())
    }

    /// Check if a session has an active run.
    pub fn has_active_run(&self, session_id: &str) -> bool {
        self.active_runs.lock().contains_key(session_id)
    }

    /// Number of active runs.
    pub fn active_run_count(&self) -> usize {
        self.active_runs.lock().len()
    }

    /// Abort a running session by cancelling its `CancellationToken`.
    /// Returns true if the session had an active run that was cancelled.
    pub fn abort(&self, session_id: &str) -> Result<bool, RuntimeError> {
        let runs = self.active_runs.lock();
        if let Some(run) = runs.get(session_id) {
            run.cancel.cancel();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Check if a session is busy (currently processing).
    pub fn is_session_busy(&self, session_id: &str) -> bool {
        self.has_active_run(session_id) || self.session_manager.is_active(session_id)
    }

    /// Active session count.
    pub fn active_session_count(&self) -> usize {
        self.session_manager.active_count()
    }

    /// Maximum concurrent session limit.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_concurrent_sessions
    }

    /// Whether we can accept another concurrent session.
    pub fn can_accept_session(&self) -> bool {
        self.session_manager.active_count() < self.max_concurrent_sessions
    }

    /// Register a tool call, returning a receiver for the result.
    pub fn register_tool_call(
        &self,
        tool_call_id: &str,
    ) -> tokio::sync::oneshot::Receiver<serde_json::Value> {
        self.tool_tracker.lock().register(tool_call_id)
    }

    /// Resolve a pending tool call with a result. Returns true if found.
    pub fn resolve_tool_call(&self, tool_call_id: &str, value: serde_json::Value) -> bool {
        self.tool_tracker.lock().resolve(tool_call_id, value)
    }

    /// Check if a tool call is pending.
    pub fn has_pending_tool_call(&self, tool_call_id: &str) -> bool {
        self.tool_tracker.lock().has_pending(tool_call_id)
    }

    /// Graceful shutdown — end all active sessions.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        // Cancel all active runs
        {
            let runs = self.active_runs.lock();
            for run in runs.values() {
                run.cancel.cancel();
            }
        }

        // Cancel all pending tool calls
        self.tool_tracker.lock().cancel_all();

        // List all active sessions and end them
        let sessions = self
            .session_manager
            .list_sessions(&SessionFilter::default())
            .unwrap_or_default();

        for session in sessions {
            let _ = self.session_manager.end_session(&session.id).await;
        }

        Ok(())
    }
}
