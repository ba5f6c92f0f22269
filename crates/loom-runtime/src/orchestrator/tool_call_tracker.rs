//! Tool-call tracker — manages pending tool results via oneshot channels.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

/// Tracks pending tool calls and routes results back to the agent loop.
pub struct ToolCallTracker {
    pending: HashMap<String, oneshot::Sender<Value>>,
}

impl ToolCallTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Register a tool call, returning a receiver that will deliver the result.
    pub fn register(&mut self, tool_call_id: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.insert(tool_call_id.to_string(), tx);
        rx
    }

    /// Resolve a pending tool call with a result value.
    /// Returns `true` if the tool call was found and resolved, `false` otherwise.
    pub fn resolve(&mut self, tool_call_id: &str, value: Value) -> bool {
        if let Some(tx) = self.pending.remove(tool_call_id) {
            tx.send(value).is_ok()
        } else {
            false
        }
    }

    /// Check if a tool call is pending.
    pub fn has_pending(&self, tool_call_id: &str) -> bool {
        self.pending.contains_key(tool_call_id)
    }

    /// Number of pending tool calls.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel all pending tool calls (drops senders, receivers will get errors).
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }
}

impl Default for ToolCallTracker {
    fn default() -> Self {
        Self::new()
    }
}
