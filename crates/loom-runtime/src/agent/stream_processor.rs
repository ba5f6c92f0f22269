//! Stream processor — consumes `StreamEventStream`, accumulates content blocks.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use loom_core::content::AssistantContent;
use loom_core::events::{AssistantMessage, BaseEvent, StreamEvent, LoomEvent};
use loom_core::messages::{TokenUsage, ToolCall};

use crate::agent::event_emitter::EventEmitter;
use crate::errors::RuntimeError;
use crate::types::StreamResult;
use loom_llm::provider::{ProviderError, StreamEventStream};

/// Process an LLM stream, accumulating content and emitting events.
#[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
pub async fn process_stream(
    mut stream: StreamEventStream,
    session_id: &str,
    emitter: &Arc<EventEmitter>,
    cancel: &CancellationToken,
) -> Result<StreamResult, RuntimeError> {
    let mut text_acc = String::with_capacity(4096);
    let mut thinking_acc = String::with_capacity(2048);
    let mut tool_calls: Vec<ToolCall> = Vec::with_capacity(4);
    let mut current_tool_id: Option<String> = None;
    let mut current_tool_name: Option<String> = None;
    let mut current_tool_args = String::with_capacity(512);
    let mut token_usage: Option<TokenUsage> = None;
    #[allow(unused_assignments)]
    let mut stop_reason = String::new();
    #[allow(unused_assignments)]
    let mut final_message: Option<AssistantMessage> = None;
    let mut thinking_signature: Option<String> = None;
    let stream_start = Instant::now();
    let mut ttft_ms: Option<u64> = None;

    loop {
        // biased: prefer cancellation when both a stream event and cancel are ready
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let partial = if text_acc.is_empty() { None } else { Some(text_acc.clone()) };
                return Ok(StreamResult {
                    message: build_message(&text_acc, &thinking_acc, thinking_signature.as_deref(), &tool_calls),
                    tool_calls,
                    stop_reason: "interrupted".into(),
                    token_usage,
                    interrupted: true,
                    partial_content: partial,
                    ttft_ms,
                });
            }
            event = stream.next() => event,
        };

        match event {
            None => {
                // Stream ended without Done — treat as error
                return Err(RuntimeError::Internal(
                    "Stream ended without Done event".into(),
                ));
            }
            Some(Err(ProviderError::Cancelled)) => {
                let partial = if text_acc.is_empty() {
                    None
                } else {
                    Some(text_acc.clone())
                };
                return Ok(StreamResult {
                    message: build_message(
                        &text_acc,
                        &thinking_acc,
                        thinking_signature.as_deref(),
                        &tool_calls,
                    ),
                    tool_calls,
                    stop_reason: "interrupted".into(),
                    token_usage,
                    interrupted: true,
                    partial_content: partial,
                    ttft_ms,
                });
            }
            Some(Err(e)) => {
                return Err(RuntimeError::Provider(e));
            }
            Some(Ok(stream_event)) => {
                match stream_event {
                    StreamEvent::TextDelta { delta } => {
                        if ttft_ms.is_none() {
                            ttft_ms = Some(stream_start.elapsed().as_millis() as u64);
                        }
                        text_acc.push_str(&delta);
                        let _ = emitter.emit(LoomEvent::MessageUpdate {
                            base: BaseEvent::now(session_id),
                            content: delta,
                        });
                    }

                    StreamEvent::Start | StreamEvent::TextStart | StreamEvent::TextEnd { .. } => {}

                    StreamEvent::ThinkingStart => {
                        let _ = emitter.emit(LoomEvent::ThinkingStart {
                            base: BaseEvent::now(session_id),
                        });
                    }

                    StreamEvent::ThinkingDelta { delta } => {
                        if ttft_ms.is_none() {
                            ttft_ms = Some(stream_start.elapsed().as_millis() as u64);
                        }
                        thinking_acc.push_str(&delta);
                        let _ = emitter.emit(LoomEvent::ThinkingDelta {
                            base: BaseEvent::now(session_id),
                            delta,
                        });
                    }

                    StreamEvent::ThinkingEnd {
                        thinking,
                        signature,
                    } => {
                        thinking_acc.clone_from(&thinking);
                        thinking_signature = signature;
                        let _ = emitter.emit(LoomEvent::ThinkingEnd {
                            base: BaseEvent::now(session_id),
                            thinking,
                        });
                    }

                    StreamEvent::ToolCallStart { tool_call_id, name } => {
                        // Finalize any previous in-progress tool call
                        finalize_tool_call(
                            &mut tool_calls,
                            &mut current_tool_id,
                            &mut current_tool_name,
                            &mut current_tool_args,
                        );

                        current_tool_id = Some(tool_call_id.clone());
                        current_tool_name = Some(name.clone());
                        current_tool_args.clear();

                        let _ = emitter.emit(LoomEvent::ToolCallGenerating {
                            base: BaseEvent::now(session_id),
                            tool_call_id,
                            tool_name: name,
                        });
                    }

                    StreamEvent::ToolCallDelta {
                        tool_call_id,
                        arguments_delta,
                    } => {
                        current_tool_args.push_str(&arguments_delta);
                        let _ = emitter.emit(LoomEvent::ToolCallArgumentDelta {
                            base: BaseEvent::now(session_id),
                            tool_call_id,
                            tool_name: current_tool_name.clone(),
                            arguments_delta,
                        });
                    }

                    StreamEvent::ToolCallEnd { tool_call } => {
                        // Use the provider-parsed tool call directly
                        current_tool_id = None;
                        current_tool_name = None;
                        current_tool_args.clear();
                        tool_calls.push(tool_call);
                    }

                    StreamEvent::Done {
                        message,
                        stop_reason: sr,
                    } => {
                        stop_reason = sr;
                        token_usage.clone_from(&message.token_usage);
                        final_message = Some(message);
                        break;
                    }

                    StreamEvent::Error { error } => {
                        return Err(RuntimeError::Internal(error));
                    }

                    StreamEvent::Retry {
                        attempt,
                        max_retries,
                        delay_ms,
                        error,
                    } => {
                        let _ = emitter.emit(LoomEvent::ApiRetry {
                            base: BaseEvent::now(session_id),
                            attempt,
                            max_retries,
                            delay_ms,
                            error_category: error.category,
                            error_message: error.message,
                        });
                    }

                    StreamEvent::SafetyBlock {
                        blocked_categories,
                        error,
                    } => {
                        return Err(RuntimeError::Internal(format!(
                            "Safety block: {error} (categories: {})",
                            blocked_categories.join(", ")
                        )));
                    }
                }
            }
        }
    }

    // Finalize any trailing tool call
    finalize_tool_call(
        &mut tool_calls,
        &mut current_tool_id,
        &mut current_tool_name,
        &mut current_tool_args,
    );

    let message = final_message.unwrap_or_else(|| {
        build_message(
            &text_acc,
            &thinking_acc,
            thinking_signature.as_deref(),
            &tool_calls,
        )
    });

    Ok(StreamResult {
        message,
        tool_calls,
        stop_reason,
        token_usage,
        interrupted: false,
        partial_content: None,
        ttft_ms,
    })
}

/// Finalize an in-progress tool call from accumulated deltas.
fn finalize_tool_call(
    tool_calls: &mut Vec<ToolCall>,
    current_id: &mut Option<String>,
    current_name: &mut Option<String>,
    current_args: &mut String,
) {
    if let (Some(id), Some(name)) = (current_id.take(), current_name.take()) {
        let arguments: Map<String, serde_json::Value> =
            serde_json::from_str(current_args).unwrap_or_default();
        tool_calls.push(ToolCall {
            content_type: "tool_use".into(),
            id,
            name,
            arguments,
            thought_signature: None,
        });
        current_args.clear();
    }
}

/// Build an `AssistantMessage` from accumulated parts.
///
/// Thinking is only persisted into the message when a signature is present.
/// Signatureless thinking was already shown to the caller live via
/// `ThinkingStart`/`ThinkingDelta`/`ThinkingEnd` events and is display-only.
fn build_message(
    text: &str,
    thinking: &str,
    thinking_signature: Option<&str>,
    tool_calls: &[ToolCall],
) -> AssistantMessage {
    let mut content: Vec<AssistantContent> = Vec::with_capacity(3);

    if !thinking.is_empty() {
        if let Some(signature) = thinking_signature {
            content.push(AssistantContent::Thinking {
                thinking: thinking.to_owned(),
                signature: Some(signature.to_owned()),
            });
        }
    }

    if !text.is_empty() {
        let trimmed = text.trim_end();
        if !trimmed.is_empty() {
            content.push(AssistantContent::text(trimmed));
        }
    }

    for tc in tool_calls {
        content.push(AssistantContent::ToolUse {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: tc.arguments.clone(),
            thought_signature: tc.thought_signature.clone(),
        });
    }

    AssistantMessage {
        content,
        token_usage: None,
    }
}
