//! # loom-tokens
//!
//! Token counting, normalization, and cost calculation for LLM usage.
//!
//! - Per-provider token extraction (Anthropic / Google / `OpenAI` report differently)
//! - `TokenRecord` with source, computed, and metadata fields
//! - Cost calculation per model via pricing table
//! - Cache cost tracking with breakpoint strategy

#![deny(unsafe_code)]

pub mod errors;
pub mod extraction;
pub mod normalization;
pub mod pricing;
pub mod state;
pub mod types;

pub use errors::{Result, TokenError};
pub use normalization::normalize_tokens;
pub use pricing::{calculate_cost, format_cost, format_tokens, get_pricing_tier};
pub use state::{TokenStateManager, TokenStateManagerConfig};
pub use types::{
    AccumulatedTokens, CalculationMethod, ComputedTokens, ContextWindowState, PricingTier,
    TokenMeta, TokenRecord, TokenSource, TokenState,
};
