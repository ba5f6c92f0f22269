//! Broadcast-based event emitter for `LoomEvent` dispatch.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use loom_core::events::LoomEvent;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-based event emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers will be dropped
/// (lagged) rather than blocking the sender.
pub struct EventEmitter {
    tx: broadcast::Sender<LoomEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active subscribers.
    pub fn emit(&self, event: LoomEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that will receive
    /// all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LoomEvent> {
        self.tx.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
