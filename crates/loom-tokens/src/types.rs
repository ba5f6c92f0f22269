//! Core token tracking types.
//!
//! These types model the immutable per-turn token record pipeline:
//! raw provider data ([`TokenSource`]) → computed values ([`ComputedTokens`])
//! → audit metadata ([`TokenMeta`]) → combined [`TokenRecord`].
//!
//! Session-level aggregates ([`AccumulatedTokens`], [`ContextWindowState`],
//! [`TokenState`]) are managed by the state module.

use serde::{Deserialize, Serialize};
use loom_core::messages::ProviderType;

/// Raw token values directly from the provider API response.
///
/// These values are immutable and represent exactly what the provider
/// reported — no computation or normalization applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSource {
    /// Which provider reported these values.
    pub provider: ProviderType,
    /// ISO 8601 timestamp when tokens were extracted.
    pub timestamp: String,
    /// Raw input tokens from the API response.
    pub raw_input_tokens: u64,
    /// Raw output tokens from the API response.
    pub raw_output_tokens: u64,
    /// Tokens read from prompt cache.
    pub raw_cache_read_tokens: u64,
    /// Tokens written to prompt cache (aggregate).
    pub raw_cache_creation_tokens: u64,
    /// 5-minute TTL cache creation tokens (Anthropic per-TTL breakdown).
    pub raw_cache_creation_5m_tokens: u64,
    /// 1-hour TTL cache creation tokens (Anthropic per-TTL breakdown).
    pub raw_cache_creation_1h_tokens: u64,
}

/// Method used to calculate context window size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Anthropic: `input + cache_read + cache_creation` (three mutually exclusive buckets).
    AnthropicCacheAware,
    /// Other providers: `input_tokens` directly is the full context.
    Direct,
}

/// Computed (derived) token values from normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedTokens {
    /// Total tokens in the context window (provider-aware calculation).
    pub context_window_tokens: u64,
    /// Per-turn delta: new input tokens added this turn.
    pub new_input_tokens: u64,
    /// Previous context baseline used for delta calculation.
    pub previous_context_baseline: u64,
    /// Which calculation method was used.
    pub calculation_method: CalculationMethod,
}

/// Audit trail metadata for a token record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMeta {
    /// Turn number within the session.
    pub turn: u64,
    /// Session identifier.
    pub session_id: String,
    /// ISO 8601 timestamp when tokens were extracted from the provider.
    pub extracted_at: String,
    /// ISO 8601 timestamp when normalization was performed.
    pub normalized_at: String,
}

/// Complete per-turn token record: source + computed + metadata.
///
/// Immutable once created. Provides a full audit trail for every
/// turn's token usage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Raw values from the provider.
    pub source: TokenSource,
    /// Computed/derived values.
    pub computed: ComputedTokens,
    /// Audit metadata.
    pub meta: TokenMeta,
}

/// Session-level accumulated token totals (mutable running sums).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedTokens {
    /// Total input tokens across all turns.
    pub input_tokens: u64,
    /// Total output tokens across all turns.
    pub output_tokens: u64,
    /// Total cache read tokens across all turns.
    pub cache_read_tokens: u64,
    /// Total cache creation tokens across all turns.
    pub cache_creation_tokens: u64,
    /// Total 5-minute TTL cache creation tokens.
    pub cache_creation_5m_tokens: u64,
    /// Total 1-hour TTL cache creation tokens.
    pub cache_creation_1h_tokens: u64,
    /// Total cost in USD.
    pub cost: f64,
}

/// Current context window tracking state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowState {
    /// Tokens currently in the context window.
    pub current_size: u64,
    /// Maximum context window size for the model.
    pub max_size: u64,
    /// Percentage of context used (0.0–100.0).
    pub percent_used: f64,
    /// Tokens remaining before context limit.
    pub tokens_remaining: u64,
}

impl ContextWindowState {
    /// Create a new context window state with the given max size.
    pub fn new(max_size: u64) -> Self {
        Self {
            current_size: 0,
            max_size,
            percent_used: 0.0,
            tokens_remaining: max_size,
        }
    }

    /// Recalculate derived fields from current/max.
    #[allow(clippy::cast_precision_loss)] // Token counts never approach 2^52
    pub fn recalculate(&mut self) {
        if self.max_size > 0 {
            self.percent_used =
                (self.current_size as f64 / self.max_size as f64 * 100.0).min(100.0);
        } else {
            self.percent_used = 0.0;
        }
        self.tokens_remaining = self.max_size.saturating_sub(self.current_size);
    }
}

/// Complete session-level token state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    /// Most recent turn's record (if any turns have been processed).
    pub current: Option<TokenRecord>,
    /// Session-level accumulated totals.
    pub accumulated: AccumulatedTokens,
    /// Context window progress.
    pub context_window: ContextWindowState,
    /// Full audit trail of all turn records.
    pub history: Vec<TokenRecord>,
}

impl TokenState {
    /// Create an empty token state with the given context window limit.
    pub fn new(max_context_size: u64) -> Self {
        Self {
            current: None,
            accumulated: AccumulatedTokens::default(),
            context_window: ContextWindowState::new(max_context_size),
            history: Vec::new(),
        }
    }
}

/// Pricing tier for a model family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    /// Cost per million input tokens (USD).
    pub input_per_million: f64,
    /// Cost per million output tokens (USD).
    pub output_per_million: f64,
    /// Multiplier for 5-minute TTL cache writes (e.g., 1.25 for Anthropic).
    pub cache_write_5m_multiplier: f64,
    /// Multiplier for 1-hour TTL cache writes (e.g., 2.0 for Anthropic).
    pub cache_write_1h_multiplier: f64,
    /// Multiplier for cache reads (e.g., 0.1 for 90% discount).
    pub cache_read_multiplier: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
