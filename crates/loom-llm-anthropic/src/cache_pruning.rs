//! Prompt cache cold detection and tool result pruning.
//!
//! When the Anthropic prompt cache goes cold (>5 minutes since last API call),
//! re-caching the entire conversation is expensive. This module prunes large
//! tool result blocks from old turns to reduce cache write tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::types::AnthropicMessageParam;

/// Default cache TTL in milliseconds (5 minutes).
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Number of recent assistant turns to preserve without pruning.
pub const DEFAULT_RECENT_TURNS: usize = 3;

/// Minimum content size (bytes) to be considered for pruning.
pub const PRUNE_THRESHOLD_BYTES: usize = 2048;

/// Check whether the prompt cache has expired.
///
/// Returns `false` if `last_api_call_ms` is 0 (first request — no cache to expire)
/// or if the elapsed time is within the TTL.
#[must_use]
pub fn is_cache_cold(last_api_call_ms: u64, ttl_ms: u64) -> bool {
    if last_api_call_ms == 0 {
        return false; // First request — cache doesn't exist yet
    }
    #[allow(clippy::cast_possible_truncation)]
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    now_ms.saturating_sub(last_api_call_ms) > ttl_ms
}

/// Prune large `tool_result` content blocks from old turns.
///
/// When the cache goes cold, re-caching the entire conversation is expensive.
/// This function replaces large `tool_result` content (>2KB) in old turns with
/// a placeholder, keeping recent turns intact.
///
/// Returns a new Vec — never mutates the input.
#[must_use]
pub fn prune_tool_results_for_recache(
    messages: &[AnthropicMessageParam],
    recent_turns: usize,
) -> Vec<AnthropicMessageParam> {
    // Count assistant messages to determine turn boundaries
    let assistant_count = messages.iter().filter(|m| m.role == "assistant").count();

    if assistant_count <= recent_turns {
        return messages.to_vec(); // Not enough turns to prune
    }

    let preserve_after_turn = assistant_count - recent_turns;

    // Find cutoff index: walk messages, count assistant messages seen
    let mut turns_seen = 0usize;
    let mut cutoff_index = messages.len(); // Default: no pruning

    for (i, msg) in messages.iter().enumerate() {
        if msg.role == "assistant" {
            turns_seen += 1;
        }
        if turns_seen > preserve_after_turn {
            cutoff_index = i;
            break;
        }
    }

    // Clone messages, pruning large tool_results before the cutoff
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            if i >= cutoff_index || msg.role != "user" {
                return msg.clone();
            }
            prune_user_message_tool_results(msg)
        })
        .collect()
}

/// Prune large `tool_result` content blocks in a user message.
fn prune_user_message_tool_results(msg: &AnthropicMessageParam) -> AnthropicMessageParam {
    let pruned_content: Vec<Value> = msg
        .content
        .iter()
        .map(|block| {
            if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                return block.clone();
            }
            let content = &block["content"];
            let content_str = content.to_string();
            if content_str.len() <= PRUNE_THRESHOLD_BYTES {
                return block.clone();
            }
            // Prune: replace content with placeholder
            let mut pruned = block.clone();
            pruned["content"] = Value::String(format!(
                "[pruned {} chars for cache efficiency]",
                content_str.len()
            ));
            pruned
        })
        .collect();

    AnthropicMessageParam {
        role: msg.role.clone(),
        content: pruned_content,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
