//! Anthropic SSE stream handler.
//!
//! Converts raw Anthropic SSE events (`message_start`, `content_block_delta`, etc.)
//! into unified [`StreamEvent`]s consumed by the agent runtime.
//!
//! The handler maintains a [`StreamState`] that accumulates text, thinking, signature,
//! and tool arguments across delta events, then emits complete blocks on `content_block_stop`.

use serde_json::Map;
use tracing::{info, warn};

use loom_core::content::AssistantContent;
use loom_core::events::{AssistantMessage, StreamEvent};
use loom_core::messages::{TokenUsage, ToolCall};

use crate::types::{AnthropicSseEvent, SseContentBlock, SseDelta};

/// Stream state accumulated across SSE events.
#[derive(Clone, Debug, Default)]
pub struct StreamState {
    /// Provider type for token attribution in Done events.
    pub provider_type: loom_core::messages::ProviderType,
    /// Current content block type being accumulated.
    pub current_block_type: Option<BlockType>,
    /// Tool call ID for the current `tool_use` block.
    pub current_tool_call_id: Option<String>,
    /// Tool name for the current `tool_use` block.
    pub current_tool_name: Option<String>,
    /// Accumulated text content.
    pub accumulated_text: String,
    /// Accumulated thinking content.
    pub accumulated_thinking: String,
    /// Accumulated signature.
    pub accumulated_signature: String,
    /// Accumulated tool call JSON arguments.
    pub accumulated_args: String,
    /// Input tokens from `message_start`.
    pub input_tokens: u64,
    /// Output tokens from `message_delta`.
    pub output_tokens: u64,
    /// Cache creation tokens.
    pub cache_creation_tokens: u64,
    /// Cache read tokens.
    pub cache_read_tokens: u64,
    /// 5-minute TTL cache creation tokens.
    pub cache_creation_5m_tokens: u64,
    /// 1-hour TTL cache creation tokens.
    pub cache_creation_1h_tokens: u64,
    /// Content blocks accumulated for the final `Done` event.
    pub content_blocks: Vec<AssistantContent>,
    /// Stop reason from `message_delta`.
    pub stop_reason: Option<String>,
}

/// Type of content block being accumulated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockType {
    /// Text response.
    Text,
    /// Extended thinking.
    Thinking,
    /// Tool use (function call).
    ToolUse,
}

/// Create a new stream state for a specific provider.
#[must_use]
pub fn create_stream_state_for(provider_type: loom_core::messages::ProviderType) -> StreamState {
    StreamState {
        provider_type,
        ..StreamState::default()
    }
}

/// Create a new stream state (defaults to Anthropic).
#[must_use]
pub fn create_stream_state() -> StreamState {
    create_stream_state_for(loom_core::messages::ProviderType::Anthropic)
}

/// Process a single Anthropic SSE event and return zero or more [`StreamEvent`]s.
///
/// Call this for each SSE event received. The state is mutated to track
/// accumulated content across events.
pub fn process_sse_event(event: &AnthropicSseEvent, state: &mut StreamState) -> Vec<StreamEvent> {
    match event {
        AnthropicSseEvent::MessageStart { message } => {
            state.input_tokens = message.usage.input_tokens;
            state.cache_creation_tokens = message.usage.cache_creation_input_tokens;
            state.cache_read_tokens = message.usage.cache_read_input_tokens;
            if let Some(ref cc) = message.usage.cache_creation {
                state.cache_creation_5m_tokens = cc.ephemeral_5m_input_tokens;
                state.cache_creation_1h_tokens = cc.ephemeral_1h_input_tokens;
            }

            let cache_hit = state.cache_read_tokens > 0;
            let cache_write = state.cache_creation_tokens > 0;
            info!(
                input_tokens = state.input_tokens,
                cache_read = state.cache_read_tokens,
                cache_write = state.cache_creation_tokens,
                cache_hit,
                cache_write_bool = cache_write,
                "[CACHE] message_start"
            );

            vec![]
        }

        AnthropicSseEvent::ContentBlockStart { content_block, .. } => match content_block {
            SseContentBlock::Text { .. } => {
                state.current_block_type = Some(BlockType::Text);
                vec![StreamEvent::TextStart]
            }
            SseContentBlock::Thinking { .. } => {
                state.current_block_type = Some(BlockType::Thinking);
                vec![StreamEvent::ThinkingStart]
            }
            SseContentBlock::ToolUse { id, name } => {
                state.current_block_type = Some(BlockType::ToolUse);
                state.current_tool_call_id = Some(id.clone());
                state.current_tool_name = Some(name.clone());
                vec![StreamEvent::ToolCallStart {
                    tool_call_id: id.clone(),
                    name: name.clone(),
                }]
            }
        },

        AnthropicSseEvent::ContentBlockDelta { delta, .. } => {
            match delta {
                SseDelta::TextDelta { text } => {
                    state.accumulated_text.push_str(text);
                    vec![StreamEvent::TextDelta {
                        delta: text.clone(),
                    }]
                }
                SseDelta::ThinkingDelta { thinking } => {
                    state.accumulated_thinking.push_str(thinking);
                    vec![StreamEvent::ThinkingDelta {
                        delta: thinking.clone(),
                    }]
                }
                SseDelta::SignatureDelta { signature } => {
                    state.accumulated_signature.push_str(signature);
                    // Signature is not yielded until content_block_stop
                    vec![]
                }
                SseDelta::InputJsonDelta { partial_json } => {
                    state.accumulated_args.push_str(partial_json);
                    if let Some(ref id) = state.current_tool_call_id {
                        vec![StreamEvent::ToolCallDelta {
                            tool_call_id: id.clone(),
                            arguments_delta: partial_json.clone(),
                        }]
                    } else {
                        vec![]
                    }
                }
            }
        }

        AnthropicSseEvent::ContentBlockStop { .. } => handle_content_block_stop(state),

        AnthropicSseEvent::MessageDelta { delta, usage } => {
            state.stop_reason.clone_from(&delta.stop_reason);
            if let Some(u) = usage {
                state.output_tokens = u.output_tokens;
            }
            vec![]
        }

        AnthropicSseEvent::MessageStop => {
            let done_event = build_done_event(state);
            vec![done_event]
        }

        AnthropicSseEvent::Ping => vec![],

        AnthropicSseEvent::Error { error } => {
            warn!(
                error_type = %error.error_type,
                message = %error.message,
                "Anthropic SSE error"
            );
            vec![StreamEvent::Error {
                error: format!("{}: {}", error.error_type, error.message),
            }]
        }
    }
}

/// Handle a `content_block_stop` SSE event by finalizing the current block.
fn handle_content_block_stop(state: &mut StreamState) -> Vec<StreamEvent> {
    match state.current_block_type.take() {
        Some(BlockType::Text) => {
            let text = std::mem::take(&mut state.accumulated_text);
            state
                .content_blocks
                .push(AssistantContent::Text { text: text.clone() });
            vec![StreamEvent::TextEnd {
                text,
                signature: None,
            }]
        }
        Some(BlockType::Thinking) => {
            let thinking = std::mem::take(&mut state.accumulated_thinking);
            let signature = if state.accumulated_signature.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut state.accumulated_signature))
            };
            state.content_blocks.push(AssistantContent::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            });
            vec![StreamEvent::ThinkingEnd {
                thinking,
                signature,
            }]
        }
        Some(BlockType::ToolUse) => {
            let args_str = std::mem::take(&mut state.accumulated_args);
            let arguments: Map<String, serde_json::Value> =
                serde_json::from_str(&args_str).unwrap_or_default();
            let id = state.current_tool_call_id.take().unwrap_or_default();
            let name = state.current_tool_name.take().unwrap_or_default();

            let tool_call = ToolCall {
                content_type: "tool_use".into(),
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
                thought_signature: None,
            };

            state.content_blocks.push(AssistantContent::ToolUse {
                id,
                name,
                arguments,
                thought_signature: None,
            });

            vec![StreamEvent::ToolCallEnd { tool_call }]
        }
        None => vec![],
    }
}

/// Build the final `Done` event from accumulated state.
fn build_done_event(state: &mut StreamState) -> StreamEvent {
    let content = std::mem::take(&mut state.content_blocks);
    let stop_reason = state
        .stop_reason
        .take()
        .unwrap_or_else(|| "end_turn".into());

    let token_usage = if state.input_tokens > 0 || state.output_tokens > 0 {
        Some(TokenUsage {
            input_tokens: state.input_tokens,
            output_tokens: state.output_tokens,
            cache_read_tokens: if state.cache_read_tokens > 0 {
                Some(state.cache_read_tokens)
            } else {
                None
            },
            cache_creation_tokens: if state.cache_creation_tokens > 0 {
                Some(state.cache_creation_tokens)
            } else {
                None
            },
            cache_creation_5m_tokens: if state.cache_creation_5m_tokens > 0 {
                Some(state.cache_creation_5m_tokens)
            } else {
                None
            },
            cache_creation_1h_tokens: if state.cache_creation_1h_tokens > 0 {
                Some(state.cache_creation_1h_tokens)
            } else {
                None
            },
            provider_type: Some(state.provider_type.clone()),
        })
    } else {
        None
    };

    StreamEvent::Done {
        message: AssistantMessage {
            content,
            token_usage,
        },
        stop_reason,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
