//! Message reconstruction from event ancestry.
//!
//! [`reconstruct_from_events`] implements a two-pass algorithm that rebuilds
//! the message list from an ordered sequence of [`SessionEvent`]s:
//!
//! 1. **First pass**: collect deleted event IDs, tool call argument maps,
//!    reasoning level, and system prompt.
//! 2. **Second pass**: build messages while handling deletions, compaction,
//!    context clears, tool result injection, and consecutive-role merging.
//!
//! The output is a [`ReconstructionResult`] containing messages with event IDs,
//! aggregate token usage, turn count, and config state.

use serde_json::Value;

use crate::types::base::SessionEvent;
use crate::types::state::{Message, MessageWithEventId};

/// Prefix for compaction summary messages, matching TypeScript `context/constants.ts`.
pub const COMPACTION_SUMMARY_PREFIX: &str = "[Context from earlier in this conversation]";
/// Assistant acknowledgement text after compaction, matching TypeScript `context/constants.ts`.
pub const COMPACTION_ACK_TEXT: &str =
    "I understand the previous context. Let me continue helping you.";

/// Result of reconstructing messages from event ancestry.
#[derive(Clone, Debug)]
pub struct ReconstructionResult {
    /// Reconstructed messages with their source event IDs.
    pub messages_with_event_ids: Vec<MessageWithEventId>,
    /// Aggregate token usage across all message events.
    pub token_usage: ReconstructedTokenUsage,
    /// Highest turn number seen.
    pub turn_count: i64,
    /// Last-seen reasoning level from `config.reasoning_level` events.
    pub reasoning_level: Option<String>,
    /// System prompt from `session.start` or `config.prompt_update`.
    pub system_prompt: Option<String>,
}

/// Aggregate token usage accumulated during reconstruction.
#[derive(Clone, Debug, Default)]
pub struct ReconstructedTokenUsage {
    /// Total input tokens.
    pub input_tokens: i64,
    /// Total output tokens.
    pub output_tokens: i64,
    /// Total cache read tokens.
    pub cache_read_tokens: i64,
    /// Total cache creation tokens.
    pub cache_creation_tokens: i64,
}

/// Pending tool result accumulated between assistant messages.
struct PendingToolResult {
    tool_call_id: String,
    content: String,
    is_error: bool,
}

/// Reconstruct messages and state from an ordered list of ancestor events.
///
/// Implements the two-pass reconstruction algorithm matching the TypeScript
/// `reconstructFromEvents` exactly:
///
/// - **Pass 1**: Metadata collection (deletions, tool args, config)
/// - **Pass 2**: Message building (merging, compaction, tool result injection)
///
/// # Arguments
///
/// * `ancestors` - Ordered events from `session.start` to target event.
pub fn reconstruct_from_events(ancestors: &[SessionEvent]) -> ReconstructionResult {
    let metadata = collect_metadata(ancestors);
    build_messages(ancestors, &metadata)
}

/// Pass 1 output: metadata collected from events.
struct Metadata {
    deleted_event_ids: std::collections::HashSet<String>,
    tool_call_args_map: std::collections::HashMap<String, Value>,
    reasoning_level: Option<String>,
    system_prompt: Option<String>,
}

/// Pass 1: Collect deleted event IDs, tool call arguments, and config state.
fn collect_metadata(ancestors: &[SessionEvent]) -> Metadata {
    let mut deleted_event_ids = std::collections::HashSet::new();
    let mut tool_call_args_map = std::collections::HashMap::new();
    let mut reasoning_level: Option<String> = None;
    let mut system_prompt: Option<String> = None;

    for event in ancestors {
        match event.event_type.as_str() {
            "message.deleted" => {
                if let Some(target) = event.payload.get("targetEventId").and_then(Value::as_str) {
                    let _ = deleted_event_ids.insert(target.to_string());
                }
            }
            "tool.call" => {
                let tc_id = event.payload.get("toolCallId").and_then(Value::as_str);
                let args = event.payload.get("arguments");
                if let (Some(id), Some(a)) = (tc_id, args) {
                    let _ = tool_call_args_map.insert(id.to_string(), a.clone());
                }
            }
            "config.reasoning_level" => {
                reasoning_level = event
                    .payload
                    .get("newLevel")
                    .and_then(Value::as_str)
                    .map(String::from);
            }
            "session.start" => {
                if let Some(sp) = event.payload.get("systemPrompt").and_then(Value::as_str) {
                    system_prompt = Some(sp.to_string());
                }
            }
            "config.prompt_update" => {
                if event.payload.get("contentBlobId").is_some() {
                    if let Some(hash) = event.payload.get("newHash").and_then(Value::as_str) {
                        system_prompt = Some(format!("[Updated prompt - hash: {hash}]"));
                    }
                }
            }
            _ => {}
        }
    }

    Metadata {
        deleted_event_ids,
        tool_call_args_map,
        reasoning_level,
        system_prompt,
    }
}

/// Pass 2: Build messages from events using metadata from pass 1.
/// Mutable state carried through the message-building pass.
struct BuildState {
    combined: Vec<MessageWithEventId>,
    tokens: ReconstructedTokenUsage,
    turn_count: i64,
    current_turn: i64,
    pending_tool_results: Vec<PendingToolResult>,
}

/// Pass 2: Build messages from events using metadata from pass 1.
fn build_messages(ancestors: &[SessionEvent], metadata: &Metadata) -> ReconstructionResult {
    let mut st = BuildState {
        combined: Vec::new(),
        tokens: ReconstructedTokenUsage::default(),
        turn_count: 0,
        current_turn: 0,
        pending_tool_results: Vec::new(),
    };

    for event in ancestors {
        if metadata.deleted_event_ids.contains(&event.id) {
            continue;
        }
        match event.event_type.as_str() {
            "compact.summary" => handle_compact_summary(event, &mut st),
            "context.cleared" => handle_context_cleared(&mut st),
            "tool.result" => handle_tool_result(event, &mut st),
            "message.user" => handle_message_user(event, &mut st),
            "message.assistant" => handle_message_assistant(event, metadata, &mut st),
            _ => {}
        }
    }

    // End-of-stream flush: if last message is assistant with tool_use
    if !st.pending_tool_results.is_empty() {
        if let Some(last) = st.combined.last() {
            if last.message.role == "assistant" && content_has_tool_use(&last.message.content) {
                flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
            }
        }
    }

    // Inject synthetic error results for any unmatched tool calls.
    // This happens when: (a) a user interrupt discards pending tool results,
    // or (b) the session ended mid-tool-execution before results arrived.
    // Without this, providers like OpenAI reject the history because every
    // function_call must have a corresponding function_call_output.
    inject_missing_tool_results(&mut st.combined);

    ReconstructionResult {
        messages_with_event_ids: st.combined,
        token_usage: st.tokens,
        turn_count: st.turn_count,
        reasoning_level: metadata.reasoning_level.clone(),
        system_prompt: metadata.system_prompt.clone(),
    }
}

/// Handle `compact.summary`: clear all state, inject synthetic pair.
fn handle_compact_summary(event: &SessionEvent, st: &mut BuildState) {
    let summary = event
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("");
    st.combined.clear();
    st.pending_tool_results.clear();

    st.combined.push(MessageWithEventId {
        message: Message {
            role: "user".to_string(),
            content: Value::String(format!("{COMPACTION_SUMMARY_PREFIX}\n\n{summary}")),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
    st.combined.push(MessageWithEventId {
        message: Message {
            role: "assistant".to_string(),
            content: serde_json::json!([{ "type": "text", "text": COMPACTION_ACK_TEXT }]),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
}

/// Handle `context.cleared`: discard all messages.
fn handle_context_cleared(st: &mut BuildState) {
    st.combined.clear();
    st.pending_tool_results.clear();
}

/// Handle `tool.result`: accumulate for later flushing.
fn handle_tool_result(event: &SessionEvent, st: &mut BuildState) {
    let tc_id = event
        .payload
        .get("toolCallId")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let content = event
        .payload
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let is_error = event
        .payload
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    st.pending_tool_results.push(PendingToolResult {
        tool_call_id: tc_id,
        content,
        is_error,
    });
}

/// Handle `message.user`: merge consecutive, discard pending tool results.
fn handle_message_user(event: &SessionEvent, st: &mut BuildState) {
    st.pending_tool_results.clear();

    let content = event
        .payload
        .get("content")
        .cloned()
        .unwrap_or(Value::Null);

    if st.combined.last().is_some_and(|e| e.message.role == "user") {
        let last = st.combined.last_mut().unwrap();
        last.message.content = merge_message_content(&last.message.content, &content, "user");
        last.event_ids.push(Some(event.id.clone()));
    } else {
        st.combined.push(MessageWithEventId {
            message: Message {
                role: "user".to_string(),
                content,
                tool_call_id: None,
                is_error: None,
            },
            event_ids: vec![Some(event.id.clone())],
        });
    }
    accumulate_tokens(&event.payload, &mut st.tokens);
}

/// Handle `message.assistant`: restore truncated inputs, flush tool results,
/// merge consecutive, track turns.
fn handle_message_assistant(event: &SessionEvent, metadata: &Metadata, st: &mut BuildState) {
    let content = event
        .payload
        .get("content")
        .cloned()
        .unwrap_or(Value::Null);
    let restored_content = restore_truncated_inputs(&content, &metadata.tool_call_args_map);
    let has_tool_use = content_has_tool_use(&restored_content);

    // CASE 1: Last was assistant with pending tool results → flush first
    if st.combined.last().is_some_and(|e| e.message.role == "assistant")
        && !st.pending_tool_results.is_empty()
    {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    // Re-check after potential flush — merge consecutive assistant messages
    if st.combined.last().is_some_and(|e| e.message.role == "assistant") {
        let last = st.combined.last_mut().unwrap();
        last.message.content =
            merge_message_content(&last.message.content, &restored_content, "assistant");
        last.event_ids.push(Some(event.id.clone()));
    } else {
        st.combined.push(MessageWithEventId {
            message: Message {
                role: "assistant".to_string(),
                content: restored_content,
                tool_call_id: None,
                is_error: None,
            },
            event_ids: vec![Some(event.id.clone())],
        });
    }

    // CASE 2: This assistant has tool_use and pending results → flush
    if has_tool_use && !st.pending_tool_results.is_empty() {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    accumulate_tokens(&event.payload, &mut st.tokens);

    if let Some(turn) = event.payload.get("turn").and_then(Value::as_i64) {
        if turn > st.current_turn {
            st.current_turn = turn;
            st.turn_count = turn;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Inject synthetic error `toolResult` messages for any assistant `tool_use`
/// blocks that lack a corresponding `toolResult` in the following messages.
///
/// Scans through the reconstructed message list and, for each assistant message
/// containing `tool_use` blocks, checks whether matching `toolResult` messages
/// exist before the next non-toolResult message. Any unmatched tool calls get
/// a synthetic error result injected immediately after the assistant message.
fn inject_missing_tool_results(combined: &mut Vec<MessageWithEventId>) {
    let mut insertions: Vec<(usize, Vec<MessageWithEventId>)> = Vec::new();

    let mut i = 0;
    while i < combined.len() {
        if combined[i].message.role == "assistant" {
            let tool_use_ids = extract_tool_use_ids(&combined[i].message.content);
            if !tool_use_ids.is_empty() {
                // Collect tool_call_ids from following toolResult messages
                let mut matched_ids = std::collections::HashSet::new();
                let mut j = i + 1;
                while j < combined.len() && combined[j].message.role == "toolResult" {
                    if let Some(ref tc_id) = combined[j].message.tool_call_id {
                        let _ = matched_ids.insert(tc_id.clone());
                    }
                    j += 1;
                }

                // Find unmatched tool calls
                let mut synthetic = Vec::new();
                for tc_id in &tool_use_ids {
                    if !matched_ids.contains(tc_id.as_str()) {
                        synthetic.push(MessageWithEventId {
                            message: Message {
                                role: "toolResult".to_string(),
                                content: Value::String(
                                    "Tool execution was interrupted.".to_string(),
                                ),
                                tool_call_id: Some(tc_id.clone()),
                                is_error: Some(true),
                            },
                            event_ids: vec![None],
                        });
                    }
                }

                if !synthetic.is_empty() {
                    insertions.push((i + 1, synthetic));
                }
            }
        }
        i += 1;
    }

    // Apply insertions in reverse order to preserve indices
    for (idx, msgs) in insertions.into_iter().rev() {
        let _ = combined.splice(idx..idx, msgs.into_iter());
    }
}

/// Extract all `tool_use` block IDs from a message's content.
fn extract_tool_use_ids(content: &Value) -> Vec<String> {
    match content {
        Value::Array(arr) => arr
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|block| block.get("id").and_then(Value::as_str).map(String::from))
            .collect(),
        _ => vec![],
    }
}

/// Flush pending tool results as `toolResult` messages.
fn flush_tool_results(
    combined: &mut Vec<MessageWithEventId>,
    pending: &mut Vec<PendingToolResult>,
) {
    for tr in pending.drain(..) {
        combined.push(MessageWithEventId {
            message: Message {
                role: "toolResult".to_string(),
                content: Value::String(tr.content),
                tool_call_id: Some(tr.tool_call_id),
                is_error: Some(tr.is_error),
            },
            event_ids: vec![None],
        });
    }
}

/// Merge content from two messages of the same role.
fn merge_message_content(existing: &Value, incoming: &Value, role: &str) -> Value {
    if role == "user" {
        let existing_blocks = normalize_user_content(existing);
        let incoming_blocks = normalize_user_content(incoming);
        let mut merged = existing_blocks;
        merged.extend(incoming_blocks);
        Value::Array(merged)
    } else {
        // Assistant: both should be arrays, concatenate
        let existing_arr = match existing {
            Value::Array(a) => a.clone(),
            _ => vec![],
        };
        let incoming_arr = match incoming {
            Value::Array(a) => a.clone(),
            _ => vec![],
        };
        let mut merged = existing_arr;
        merged.extend(incoming_arr);
        Value::Array(merged)
    }
}

/// Normalize user content to array of content blocks.
fn normalize_user_content(content: &Value) -> Vec<Value> {
    match content {
        Value::String(s) => {
            vec![serde_json::json!({"type": "text", "text": s})]
        }
        Value::Array(arr) => arr.clone(),
        _ => vec![],
    }
}

/// Check if content contains any `tool_use` blocks.
fn content_has_tool_use(content: &Value) -> bool {
    match content {
        Value::Array(arr) => arr
            .iter()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("tool_use")),
        _ => false,
    }
}

/// Restore truncated `tool_use` inputs from the tool call args map.
fn restore_truncated_inputs(
    content: &Value,
    tool_call_args_map: &std::collections::HashMap<String, Value>,
) -> Value {
    match content {
        Value::Array(arr) => {
            let restored: Vec<Value> = arr
                .iter()
                .map(|block| {
                    let is_tool_use =
                        block.get("type").and_then(Value::as_str) == Some("tool_use");
                    let is_truncated = block
                        .get("input")
                        .and_then(|i| i.get("_truncated"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let block_id = block.get("id").and_then(Value::as_str);

                    if is_tool_use && is_truncated {
                        if let Some(id) = block_id {
                            if let Some(full_args) = tool_call_args_map.get(id) {
                                let mut restored_block = block.clone();
                                restored_block["input"] = full_args.clone();
                                return restored_block;
                            }
                        }
                    }
                    block.clone()
                })
                .collect();
            Value::Array(restored)
        }
        other => other.clone(),
    }
}

/// Accumulate token usage from a payload's `tokenUsage` field.
fn accumulate_tokens(payload: &Value, tokens: &mut ReconstructedTokenUsage) {
    if let Some(tu) = payload.get("tokenUsage") {
        tokens.input_tokens += tu.get("inputTokens").and_then(Value::as_i64).unwrap_or(0);
        tokens.output_tokens += tu.get("outputTokens").and_then(Value::as_i64).unwrap_or(0);
        tokens.cache_read_tokens += tu
            .get("cacheReadTokens")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        tokens.cache_creation_tokens += tu
            .get("cacheCreationTokens")
            .and_then(Value::as_i64)
            .unwrap_or(0);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
