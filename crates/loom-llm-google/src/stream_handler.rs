//! SSE stream handler for the Gemini API.
//!
//! Processes streaming chunks from the Gemini API and converts them to unified
//! [`StreamEvent`] values. Handles thinking/text
//! transitions, function call extraction, safety blocks, and token usage.

use std::collections::HashSet;

use serde_json::Map;
use loom_core::content::AssistantContent;
use loom_core::events::{AssistantMessage, StreamEvent};
use loom_core::messages::{ProviderType, TokenUsage, ToolCall};

use crate::types::{GeminiPart, GeminiStreamChunk, HarmProbability, SafetyRating};

/// Mutable state accumulated across SSE events within a single stream.
pub struct StreamState {
    /// Accumulated text content.
    pub accumulated_text: String,
    /// Accumulated thinking/reasoning content.
    pub accumulated_thinking: String,
    /// Accumulated tool calls.
    pub tool_calls: Vec<ToolCallState>,
    /// Input tokens reported by the API.
    pub input_tokens: u64,
    /// Output tokens reported by the API.
    pub output_tokens: u64,
    /// Whether we've emitted a `text_start` event.
    pub text_started: bool,
    /// Whether we've emitted a `thinking_start` event.
    pub thinking_started: bool,
    /// Counter for generating unique tool call IDs.
    pub tool_call_index: u32,
    /// Unique prefix for tool call ID generation (Gemini doesn't provide IDs).
    pub unique_prefix: String,
    /// Set of tool call IDs already completed (to avoid duplicates).
    pub completed_tool_ids: HashSet<String>,
}

/// State for an in-progress tool call.
pub struct ToolCallState {
    /// Generated tool call ID.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Parsed arguments.
    pub args: serde_json::Value,
    /// Thought signature from the part.
    pub thought_signature: Option<String>,
}

/// Create a new stream state for processing a Gemini SSE stream.
#[must_use]
pub fn create_stream_state() -> StreamState {
    let prefix = format!("{:08x}", rand_u32());
    StreamState {
        accumulated_text: String::new(),
        accumulated_thinking: String::new(),
        tool_calls: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        text_started: false,
        thinking_started: false,
        tool_call_index: 0,
        unique_prefix: prefix,
        completed_tool_ids: HashSet::new(),
    }
}

/// Simple pseudo-random u32 for unique prefix generation.
fn rand_u32() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    nanos ^ 0x5DEE_CE1D
}

/// Process a single SSE data line from the Gemini stream.
///
/// Returns a vec of `StreamEvent` values to emit. Most lines produce 0-2 events;
/// the `response.done` / finish reason line produces the final `Done` event.
pub fn process_stream_chunk(chunk: &GeminiStreamChunk, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    // Check for API-level error
    if let Some(ref error) = chunk.error {
        events.push(StreamEvent::Error {
            error: format!("Gemini API error ({}): {}", error.code, error.message),
        });
        return events;
    }

    // Update token usage
    if let Some(ref usage) = chunk.usage_metadata {
        state.input_tokens = u64::from(usage.prompt_token_count);
        state.output_tokens = u64::from(usage.candidates_token_count);
    }

    // Process candidates
    let Some(ref candidates) = chunk.candidates else {
        return events;
    };
    let Some(candidate) = candidates.first() else {
        return events;
    };

    // Process content parts
    if let Some(ref content) = candidate.content {
        for part in &content.parts {
            events.extend(process_part(part, state));
        }
    }

    // Handle finish reason
    if let Some(ref finish_reason) = candidate.finish_reason {
        events.extend(handle_finish(
            finish_reason,
            candidate.safety_ratings.as_deref(),
            state,
        ));
    }

    events
}

/// Process a single content part.
fn process_part(part: &GeminiPart, state: &mut StreamState) -> Vec<StreamEvent> {
    match part {
        GeminiPart::Text {
            text,
            thought,
            thought_signature: _,
        } => {
            if *thought == Some(true) {
                process_thinking_text(text, state)
            } else {
                process_regular_text(text, state)
            }
        }
        GeminiPart::FunctionCall {
            function_call,
            thought_signature,
        } => process_function_call(function_call, thought_signature.as_deref(), state),
        _ => vec![],
    }
}

/// Process a thinking/reasoning text part.
fn process_thinking_text(text: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if !state.thinking_started {
        events.push(StreamEvent::ThinkingStart);
        state.thinking_started = true;
    }

    state.accumulated_thinking.push_str(text);
    events.push(StreamEvent::ThinkingDelta {
        delta: text.to_string(),
    });

    events
}

/// Process a regular (non-thinking) text part.
fn process_regular_text(text: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    // Transition from thinking to text
    if state.thinking_started {
        events.push(StreamEvent::ThinkingEnd {
            thinking: state.accumulated_thinking.clone(),
            signature: None,
        });
        state.thinking_started = false;
    }

    if !state.text_started {
        events.push(StreamEvent::TextStart);
        state.text_started = true;
    }

    state.accumulated_text.push_str(text);
    events.push(StreamEvent::TextDelta {
        delta: text.to_string(),
    });

    events
}

/// Process a function call part.
fn process_function_call(
    fc: &crate::types::FunctionCallData,
    thought_signature: Option<&str>,
    state: &mut StreamState,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    let id = format!("call_{}_{}", state.unique_prefix, state.tool_call_index);
    state.tool_call_index += 1;

    let args_str = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".into());

    // Parse args into Map<String, Value>
    let arguments: Map<String, serde_json::Value> = match &fc.args {
        serde_json::Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    events.push(StreamEvent::ToolCallStart {
        tool_call_id: id.clone(),
        name: fc.name.clone(),
    });

    events.push(StreamEvent::ToolCallDelta {
        tool_call_id: id.clone(),
        arguments_delta: args_str,
    });

    let tool_call = ToolCall {
        content_type: "tool_use".into(),
        id: id.clone(),
        name: fc.name.clone(),
        arguments: arguments.clone(),
        thought_signature: thought_signature.map(String::from),
    };

    events.push(StreamEvent::ToolCallEnd { tool_call });

    state.tool_calls.push(ToolCallState {
        id,
        name: fc.name.clone(),
        args: fc.args.clone(),
        thought_signature: thought_signature.map(String::from),
    });

    events
}

/// Handle a finish reason from the API.
fn handle_finish(
    finish_reason: &str,
    safety_ratings: Option<&[SafetyRating]>,
    state: &mut StreamState,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    // End thinking if still active
    if state.thinking_started {
        events.push(StreamEvent::ThinkingEnd {
            thinking: state.accumulated_thinking.clone(),
            signature: None,
        });
        state.thinking_started = false;
    }

    // Handle safety block
    if finish_reason == "SAFETY" {
        if let Some(ratings) = safety_ratings {
            let blocked: Vec<String> = ratings
                .iter()
                .filter(|r| {
                    r.probability == HarmProbability::High
                        || r.probability == HarmProbability::Medium
                })
                .map(|r| format!("{:?}", r.category))
                .collect();

            if !blocked.is_empty() {
                events.push(StreamEvent::SafetyBlock {
                    blocked_categories: blocked.clone(),
                    error: format!(
                        "Response blocked by safety filter: {}",
                        blocked.join(", ")
                    ),
                });
            }
        }
    }

    // End text if active
    if state.text_started {
        events.push(StreamEvent::TextEnd {
            text: state.accumulated_text.clone(),
            signature: None,
        });
        state.text_started = false;
    }

    // Build assistant content blocks
    let mut content = Vec::new();
    if !state.accumulated_thinking.is_empty() {
        content.push(AssistantContent::Thinking {
            thinking: state.accumulated_thinking.clone(),
            signature: None,
        });
    }
    if !state.accumulated_text.is_empty() {
        content.push(AssistantContent::text(&state.accumulated_text));
    }

    // Add tool calls as ToolUse content blocks
    for tc in &state.tool_calls {
        let arguments: Map<String, serde_json::Value> = match &tc.args {
            serde_json::Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        content.push(AssistantContent::ToolUse {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments,
            thought_signature: tc.thought_signature.clone(),
        });
    }

    let stop_reason = map_google_stop_reason(finish_reason);

    events.push(StreamEvent::Done {
        message: AssistantMessage {
            content,
            token_usage: Some(TokenUsage {
                input_tokens: state.input_tokens,
                output_tokens: state.output_tokens,
                cache_read_tokens: None,
                cache_creation_tokens: None,
                cache_creation_5m_tokens: None,
                cache_creation_1h_tokens: None,
                provider_type: Some(ProviderType::Google),
            }),
        },
        stop_reason: stop_reason.into(),
    });

    events
}

/// Synthesize a done event when the stream ends without a finish reason.
pub fn synthesize_done_event(state: &mut StreamState) -> Vec<StreamEvent> {
    let finish_reason = if state.tool_calls.is_empty() {
        "STOP"
    } else {
        "TOOL_USE"
    };
    handle_finish(finish_reason, None, state)
}

/// Map a Gemini finish reason to a unified stop reason string.
fn map_google_stop_reason(reason: &str) -> &'static str {
    match reason {
        "MAX_TOKENS" => "max_tokens",
        "TOOL_USE" => "tool_use",
        _ => "end_turn",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
