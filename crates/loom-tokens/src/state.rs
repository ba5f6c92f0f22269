//! Token state manager for session-level tracking.
//!
//! [`TokenStateManager`] maintains the complete token state for a session:
//! accumulated totals, context window tracking, and full audit history.

use loom_core::messages::ProviderType;

use crate::normalization::normalize_tokens;
use crate::types::{AccumulatedTokens, TokenMeta, TokenRecord, TokenSource, TokenState};

/// Session-level token state manager.
///
/// Records per-turn usage, maintains accumulated totals, and tracks
/// context window utilization. State can be persisted and restored
/// for session resumption.
pub struct TokenStateManager {
    state: TokenState,
}

/// Configuration for [`TokenStateManager`].
#[derive(Clone, Copy)]
pub struct TokenStateManagerConfig {
    /// Maximum context window size for the model (default: 200,000).
    pub context_limit: u64,
}

impl Default for TokenStateManagerConfig {
    fn default() -> Self {
        Self {
            context_limit: 200_000,
        }
    }
}

impl TokenStateManager {
    /// Create a new state manager with the given configuration.
    #[must_use]
    pub fn new(config: TokenStateManagerConfig) -> Self {
        Self {
            state: TokenState::new(config.context_limit),
        }
    }

    /// Record a turn's token usage.
    ///
    /// Normalizes the source data, updates accumulated totals and context
    /// window tracking, and returns the immutable [`TokenRecord`].
    pub fn record_turn(&mut self, source: TokenSource, meta: TokenMeta, cost: f64) -> TokenRecord {
        let previous_baseline = self.state.context_window.current_size;
        let record = normalize_tokens(source, previous_baseline, meta);

        // Update accumulated totals
        let acc = &mut self.state.accumulated;
        acc.input_tokens += record.source.raw_input_tokens;
        acc.output_tokens += record.source.raw_output_tokens;
        acc.cache_read_tokens += record.source.raw_cache_read_tokens;
        acc.cache_creation_tokens += record.source.raw_cache_creation_tokens;
        acc.cache_creation_5m_tokens += record.source.raw_cache_creation_5m_tokens;
        acc.cache_creation_1h_tokens += record.source.raw_cache_creation_1h_tokens;
        acc.cost += cost;

        // Update context window
        self.state.context_window.current_size = record.computed.context_window_tokens;
        self.state.context_window.recalculate();

        // Store in history
        self.state.current = Some(record.clone());
        self.state.history.push(record.clone());

        record
    }

    /// Get the current token state (read-only).
    #[must_use]
    pub fn state(&self) -> &TokenState {
        &self.state
    }

    /// Handle a provider change (resets context window baseline).
    ///
    /// Preserves accumulated tokens and history but resets the context
    /// window current size to 0 so the next turn starts fresh deltas.
    pub fn on_provider_change(&mut self, _new_provider: ProviderType) {
        self.state.context_window.current_size = 0;
        self.state.context_window.recalculate();
    }

    /// Update the context window limit (e.g., after model switch).
    pub fn set_context_limit(&mut self, limit: u64) {
        self.state.context_window.max_size = limit;
        self.state.context_window.recalculate();
    }

    /// Restore state from a previous session.
    ///
    /// Used for session resumption. Restores full history and accumulated
    /// totals, with the context window derived from the latest record.
    pub fn restore_state(
        &mut self,
        history: Vec<TokenRecord>,
        accumulated: Option<AccumulatedTokens>,
    ) {
        if let Some(last) = history.last() {
            self.state.current = Some(last.clone());
            self.state.context_window.current_size = last.computed.context_window_tokens;
            self.state.context_window.recalculate();
        }

        if let Some(acc) = accumulated {
            self.state.accumulated = acc;
        }

        self.state.history = history;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
