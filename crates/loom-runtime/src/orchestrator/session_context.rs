//! Per-session mutable state holder.

use std::sync::Arc;

use loom_events::EventStore;

use crate::orchestrator::event_persister::EventPersister;

/// Per-session runtime state.
pub struct SessionContext {
    /// Session identifier.
    pub session_id: String,
    /// Event persister for this session (Arc-shared so callers can clone it).
    pub persister: Arc<EventPersister>,
}

impl SessionContext {
    /// Create a new session context.
    pub fn new(session_id: String, event_store: Arc<EventStore>) -> Self {
        let persister = Arc::new(EventPersister::new(event_store, session_id.clone()));
        Self {
            session_id,
            persister,
        }
    }
}
