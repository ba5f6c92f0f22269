//! Persistence helpers — build JSON structures for event payloads.
//!
//! These transform Rust types into the JSON shapes that the event store
//! and iOS client expect. The key fix: provider type is now **dynamic**
//! (not hardcoded to "anthropic").

use serde_json::{json, Value};
use loom_core::content::AssistantContent;
use loom_core::messages::TokenUsage;
use loom_llm::models::types::ProviderType;
use loom_tokens::types::{TokenMeta, TokenSource};

/// Build a JSON content array from assistant content blocks.
///
/// Renames `arguments` → `input` on `tool_use` blocks (Anthropic API wire format
/// that iOS expects). Thinking blocks without a signature are display-only and
/// dropped here — they must never be persisted.
pub fn build_content_json(content: &[AssistantContent]) -> Vec<Value> {
    content.iter().filter_map(content_block_to_json).collect()
}

/// Build `tokenUsage` JSON from a [`TokenUsage`] struct.
pub fn build_token_usage_json(usage: &TokenUsage) -> Value {
    let mut obj = json!({
        "inputTokens": usage.input_tokens,
        "outputTokens": usage.output_tokens,
    });
    let m = obj.as_object_mut().unwrap();
    if let Some(cr) = usage.cache_read_tokens {
        let _ = m.insert("cacheReadInputTokens".into(), json!(cr));
    }
    if let Some(cc) = usage.cache_creation_tokens {
        let _ = m.insert("cacheCreationInputTokens".into(), json!(cc));
    }
    obj
}

/// Build the nested `tokenRecord` structure for iOS compatibility.
///
/// Provider type is **dynamic** — uses the actual provider, not hardcoded "anthropic".
/// Delegates to [`loom_tokens::normalize_tokens`] for provider-aware context
/// window and per-turn delta calculation, so `previous_context_baseline` carries
/// real meaning instead of being hardcoded to zero.
pub fn build_token_record(
    usage: &TokenUsage,
    provider_type: ProviderType,
    session_id: &str,
    turn: u32,
    previous_context_baseline: u64,
) -> Value {
    let now = chrono::Utc::now().to_rfc3339();

    let source = TokenSource {
        provider: provider_type,
        timestamp: now.clone(),
        raw_input_tokens: usage.input_tokens,
        raw_output_tokens: usage.output_tokens,
        raw_cache_read_tokens: usage.cache_read_tokens.unwrap_or(0),
        raw_cache_creation_tokens: usage.cache_creation_tokens.unwrap_or(0),
        raw_cache_creation_5m_tokens: usage.cache_creation_5m_tokens.unwrap_or(0),
        raw_cache_creation_1h_tokens: usage.cache_creation_1h_tokens.unwrap_or(0),
    };
    let meta = TokenMeta {
        turn: u64::from(turn),
        session_id: session_id.to_string(),
        extracted_at: now,
        normalized_at: String::new(),
    };

    let record = loom_tokens::normalize_tokens(source, previous_context_baseline, meta);
    serde_json::to_value(&record).unwrap_or(Value::Null)
}

// ─── Internal helpers ────────────────────────────────────────────────────────

/// Convert one content block to its persisted JSON shape, or `None` if the
/// block must not be persisted (signatureless thinking).
fn content_block_to_json(block: &AssistantContent) -> Option<Value> {
    match block {
        AssistantContent::Text { text } => {
            Some(json!({ "type": "text", "text": text }))
        }
        AssistantContent::Thinking {
            thinking,
            signature,
        } => {
            let sig = signature.as_ref()?;
            Some(json!({ "type": "thinking", "thinking": thinking, "signature": sig }))
        }
        AssistantContent::ToolUse {
            id,
            name,
            arguments,
            thought_signature,
        } => {
            // Rename "arguments" → "input" for iOS/Anthropic API wire format
            let mut obj = json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": Value::Object(arguments.clone()),
            });
            if let Some(sig) = thought_signature {
                obj["thoughtSignature"] = json!(sig);
            }
            Some(obj)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
