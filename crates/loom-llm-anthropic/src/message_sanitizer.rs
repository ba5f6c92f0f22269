//! # Message Sanitizer
//!
//! Pre-conversion sanitization for messages before they're sent to the Anthropic API.
//! Ports phases 1–4 from the TypeScript `sanitizeMessages()`.
//!
//! Invariants enforced:
//! 1. Every `tool_use` block has a corresponding `ToolResult` message
//! 2. No empty messages
//! 3. No thinking-only assistant messages (display-only, no signature)
//! 4. First message is user role
//!
//! This is idempotent: `sanitize(sanitize(x)) == sanitize(x)`.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use loom_core::content::AssistantContent;
use loom_core::messages::{Message, ToolResultMessageContent};

/// Content for synthetic tool results when execution was interrupted.
const INTERRUPTED_CONTENT: &str = "[Interrupted]";

/// Content for placeholder user message when conversation doesn't start with user.
const CONTINUED_CONTENT: &str = "[Continued]";

/// Sanitize messages to guarantee API compliance.
///
/// Returns a new `Vec<Message>` with fixes applied:
/// - Empty messages filtered out
/// - Thinking-only assistant messages (no signature) filtered out
/// - Duplicate tool_use IDs deduplicated
/// - Synthetic tool results injected for unmatched tool_use blocks
/// - Placeholder user message prepended if first message isn't user
pub fn sanitize_messages(messages: Vec<Message>) -> Vec<Message> {
    // PHASE 1: Filter invalid messages, deduplicate tool_use IDs
    let mut valid: Vec<Message> = Vec::with_capacity(messages.len());
    let mut seen_tool_use_ids: HashSet<String> = HashSet::new();
    // tool_use_id → index in `valid` where the assistant message lives
    let mut tool_use_locations: HashMap<String, usize> = HashMap::new();

    for msg in messages {
        match &msg {
            Message::User { content, .. } => {
                if !is_valid_user_content(content) {
                    warn!("Removed empty user message");
                    continue;
                }
                valid.push(msg);
            }
            Message::Assistant { content, .. } => {
                // Filter out duplicate tool_use blocks
                let mut filtered: Vec<AssistantContent> = Vec::with_capacity(content.len());
                for block in content {
                    if let AssistantContent::ToolUse { id, .. } = block {
                        if seen_tool_use_ids.contains(id) {
                            warn!(tool_use_id = %id, "Removed duplicate tool_use block");
                            continue;
                        }
                        let _ = seen_tool_use_ids.insert(id.clone());
                    }
                    filtered.push(block.clone());
                }

                // Check if remaining content survives API conversion
                if !has_content_surviving_conversion(&filtered) {
                    warn!("Removed assistant message with no content surviving conversion");
                    continue;
                }

                let idx = valid.len();

                // Track tool_use locations for synthetic result injection
                for block in &filtered {
                    if let AssistantContent::ToolUse { id, .. } = block {
                        let _ = tool_use_locations.insert(id.clone(), idx);
                    }
                }

                valid.push(Message::Assistant {
                    content: filtered,
                    usage: None,
                    cost: None,
                    stop_reason: None,
                    thinking: None,
                });
            }
            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                if tool_call_id.is_empty() {
                    warn!("Removed tool result with empty tool_call_id");
                    continue;
                }
                if !is_valid_tool_result_content(content) {
                    warn!(tool_call_id = %tool_call_id, "Removed empty tool result");
                    continue;
                }
                valid.push(msg);
            }
        }
    }

    // PHASE 2: Collect existing tool result IDs
    let existing_result_ids: HashSet<&str> = valid
        .iter()
        .filter_map(|msg| {
            if let Message::ToolResult { tool_call_id, .. } = msg {
                Some(tool_call_id.as_str())
            } else {
                None
            }
        })
        .collect();

    // PHASE 3: Inject synthetic tool results for unmatched tool_use blocks
    // Group missing IDs by assistant message index
    let mut missing_by_index: HashMap<usize, Vec<String>> = HashMap::new();
    for (tool_use_id, assistant_idx) in &tool_use_locations {
        if !existing_result_ids.contains(tool_use_id.as_str()) {
            missing_by_index
                .entry(*assistant_idx)
                .or_default()
                .push(tool_use_id.clone());
        }
    }

    // Sort indices descending to insert without shifting issues
    let mut sorted_indices: Vec<usize> = missing_by_index.keys().copied().collect();
    sorted_indices.sort_unstable_by(|a, b| b.cmp(a));

    for assistant_idx in sorted_indices {
        if let Some(missing_ids) = missing_by_index.get(&assistant_idx) {
            // Insert in reverse to maintain original tool_use order
            for tool_call_id in missing_ids.iter().rev() {
                warn!(tool_call_id = %tool_call_id, "Injected synthetic tool result for interrupted execution");
                valid.insert(
                    assistant_idx + 1,
                    Message::ToolResult {
                        tool_call_id: tool_call_id.clone(),
                        content: ToolResultMessageContent::Text(INTERRUPTED_CONTENT.into()),
                        is_error: None,
                    },
                );
            }
        }
    }

    // PHASE 4: Ensure first message is user role
    if !valid.is_empty() && !valid[0].is_user() {
        warn!("Injected placeholder user message at start");
        valid.insert(0, Message::user(CONTINUED_CONTENT));
    }

    valid
}

/// Check if assistant content will survive API conversion.
///
/// Thinking blocks without signatures are filtered out before sending to the API.
/// If a message contains ONLY such blocks, it would become empty.
fn has_content_surviving_conversion(content: &[AssistantContent]) -> bool {
    content.iter().any(|block| match block {
        AssistantContent::Text { .. } | AssistantContent::ToolUse { .. } => true,
        AssistantContent::Thinking { signature, .. } => {
            signature.as_ref().is_some_and(|s| !s.is_empty())
        }
    })
}

/// Check if user message content is non-empty.
fn is_valid_user_content(content: &loom_core::messages::UserMessageContent) -> bool {
    match content {
        loom_core::messages::UserMessageContent::Text(text) => !text.trim().is_empty(),
        loom_core::messages::UserMessageContent::Blocks(blocks) => !blocks.is_empty(),
    }
}

/// Check if tool result content is non-empty.
fn is_valid_tool_result_content(content: &ToolResultMessageContent) -> bool {
    match content {
        ToolResultMessageContent::Text(_) => true,
        ToolResultMessageContent::Blocks(blocks) => !blocks.is_empty(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
