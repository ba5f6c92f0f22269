//! # Message Converter
//!
//! Converts loom-core [`Context`] messages into Anthropic Messages API format.
//! Handles:
//! - User/assistant/tool-result message conversion
//! - Thinking block signature handling (only include with signature)
//! - Tool call ID remapping for cross-provider compatibility
//! - System prompt construction with OAuth cache breakpoints
//! - Tool definitions with cache control

use std::collections::HashMap;

use serde_json::{json, Value};
use loom_core::content::{AssistantContent, ToolResultContent, UserContent};
use loom_core::messages::{
    Context, Message, ToolResultMessageContent, UserMessageContent,
};
use loom_llm::{
    build_tool_call_id_mapping, compose_context_parts, compose_context_parts_grouped,
    remap_tool_call_id, IdFormat,
};

use crate::types::{
    AnthropicMessageParam, AnthropicTool, CacheControl, SystemPromptBlock,
    OAUTH_SYSTEM_PROMPT_PREFIX,
};

// ─────────────────────────────────────────────────────────────────────────────
// Message conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a [`Context`] into Anthropic Messages API parameters.
///
/// Returns `(system, messages, tools)` where:
/// - `system` is the system prompt (string for API key, array of blocks for OAuth)
/// - `messages` is the list of Anthropic message params
/// - `tools` is the optional tool list
pub fn convert_context(
    context: &Context,
    is_oauth: bool,
) -> (Option<Value>, Vec<AnthropicMessageParam>, Option<Vec<AnthropicTool>>) {
    // Build tool call ID mapping for cross-provider compatibility
    let id_mapping = build_id_mapping(&context.messages);

    // Convert messages
    let messages = convert_messages_impl(&context.messages, &id_mapping);

    // Convert tools
    let tools = context.tools.as_ref().map(|t| convert_tools(t, is_oauth));

    // Build system prompt
    let system = build_system_prompt(context, is_oauth);

    (system, messages, tools)
}

/// Build tool call ID mapping from messages for cross-provider compatibility.
fn build_id_mapping(messages: &[Message]) -> HashMap<String, String> {
    let mut all_tool_calls = Vec::new();
    for msg in messages {
        if let Message::Assistant { content, .. } = msg {
            for c in content {
                if let AssistantContent::ToolUse { id, .. } = c {
                    all_tool_calls.push(id.as_str());
                }
            }
        }
    }
    build_tool_call_id_mapping(&all_tool_calls, IdFormat::Anthropic)
}

/// Convert conversation messages to Anthropic format.
///
/// Builds tool call ID remapping internally, converting OpenAI-format
/// IDs to Anthropic format (`toolu_remap_N`).
pub fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessageParam> {
    let id_mapping = build_id_mapping(messages);
    convert_messages_impl(messages, &id_mapping)
}

/// Convert conversation messages to Anthropic format with an explicit ID mapping.
fn convert_messages_impl(
    messages: &[Message],
    id_mapping: &HashMap<String, String>,
) -> Vec<AnthropicMessageParam> {
    let mut result = Vec::new();

    for msg in messages {
        match msg {
            Message::User { content, .. } => {
                result.push(convert_user_message(content));
            }
            Message::Assistant { content, .. } => {
                result.push(convert_assistant_message(content, id_mapping));
            }
            Message::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => {
                result.push(convert_tool_result(
                    tool_call_id,
                    content,
                    *is_error,
                    id_mapping,
                ));
            }
        }
    }

    result
}

/// Convert a user message to Anthropic format.
fn convert_user_message(content: &UserMessageContent) -> AnthropicMessageParam {
    let blocks = match content {
        UserMessageContent::Text(text) => {
            vec![json!({"type": "text", "text": text})]
        }
        UserMessageContent::Blocks(blocks) => blocks.iter().map(convert_user_content).collect(),
    };

    AnthropicMessageParam {
        role: "user".into(),
        content: blocks,
    }
}

/// Convert a user content block to Anthropic JSON format.
fn convert_user_content(content: &UserContent) -> Value {
    match content {
        UserContent::Text { text } => json!({"type": "text", "text": text}),
        UserContent::Image { data, mime_type } => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data,
            }
        }),
        UserContent::Document { data, mime_type, .. } => json!({
            "type": "document",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data,
            }
        }),
    }
}

/// Convert an assistant message to Anthropic format.
///
/// Thinking blocks are only included if they have a signature (extended thinking).
/// Display-only thinking (no signature) is filtered out — sending it back to the
/// API would cause a validation error.
fn convert_assistant_message(
    content: &[AssistantContent],
    id_mapping: &HashMap<String, String>,
) -> AnthropicMessageParam {
    let blocks: Vec<Value> = content
        .iter()
        .filter_map(|c| convert_assistant_content(c, id_mapping))
        .collect();

    AnthropicMessageParam {
        role: "assistant".into(),
        content: blocks,
    }
}

/// Convert a single assistant content block to Anthropic JSON.
///
/// Returns `None` for thinking blocks without a signature (display-only).
fn convert_assistant_content(
    content: &AssistantContent,
    id_mapping: &HashMap<String, String>,
) -> Option<Value> {
    match content {
        AssistantContent::Text { text } => Some(json!({"type": "text", "text": text})),
        AssistantContent::Thinking {
            thinking,
            signature,
        } => {
            // Only include thinking blocks with signatures (extended thinking models).
            // Display-only thinking (no signature) MUST NOT be sent back.
            let sig = signature.as_ref()?;
            Some(json!({
                "type": "thinking",
                "thinking": thinking,
                "signature": sig,
            }))
        }
        AssistantContent::ToolUse {
            id,
            name,
            arguments,
            ..
        } => {
            let remapped_id = remap_tool_call_id(id, id_mapping);
            Some(json!({
                "type": "tool_use",
                "id": remapped_id,
                "name": name,
                "input": arguments,
            }))
        }
    }
}

/// Convert a tool result message to Anthropic format.
fn convert_tool_result(
    tool_call_id: &str,
    content: &ToolResultMessageContent,
    is_error: Option<bool>,
    id_mapping: &HashMap<String, String>,
) -> AnthropicMessageParam {
    let remapped_id = remap_tool_call_id(tool_call_id, id_mapping);

    let result_content = match content {
        ToolResultMessageContent::Text(text) => vec![json!({"type": "text", "text": text})],
        ToolResultMessageContent::Blocks(blocks) => {
            blocks.iter().map(convert_tool_result_content).collect()
        }
    };

    let mut block = json!({
        "type": "tool_result",
        "tool_use_id": remapped_id,
        "content": result_content,
    });

    if is_error == Some(true) {
        block["is_error"] = json!(true);
    }

    AnthropicMessageParam {
        role: "user".into(),
        content: vec![block],
    }
}

/// Convert a tool result content block to Anthropic JSON.
fn convert_tool_result_content(content: &ToolResultContent) -> Value {
    match content {
        ToolResultContent::Text { text } => json!({"type": "text", "text": text}),
        ToolResultContent::Image { data, mime_type } => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": mime_type,
                "data": data,
            }
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// System prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Build the system prompt value.
///
/// For OAuth: returns an array of [`SystemPromptBlock`]s with cache breakpoints.
/// For API key: returns a plain concatenated string.
fn build_system_prompt(context: &Context, is_oauth: bool) -> Option<Value> {
    if is_oauth {
        Some(build_system_prompt_oauth(context))
    } else {
        build_system_prompt_plain(context)
    }
}

/// Build system prompt for OAuth connections with cache breakpoints.
///
/// Cache breakpoints (4-tier):
/// - Breakpoint 2: Last stable block (rules, system prompt) → 1h TTL
/// - Breakpoint 3: Last volatile block (memory) → 5m TTL (default)
fn build_system_prompt_oauth(context: &Context) -> Value {
    let grouped = compose_context_parts_grouped(context);

    let mut blocks: Vec<SystemPromptBlock> = Vec::new();

    // OAuth prefix (always first)
    blocks.push(SystemPromptBlock::text(OAUTH_SYSTEM_PROMPT_PREFIX));

    // Stable parts (system prompt, rules — cache at 1h)
    for part in &grouped.stable {
        blocks.push(SystemPromptBlock::text(part));
    }

    // Volatile parts (memory — cache at 5m)
    for part in &grouped.volatile {
        blocks.push(SystemPromptBlock::text(part));
    }

    if blocks.len() <= 1 && blocks[0].text == OAUTH_SYSTEM_PROMPT_PREFIX {
        // Only prefix — apply 5m cache to it
        blocks[0].cache_control = Some(CacheControl {
            cache_type: "ephemeral".into(),
            ttl: None,
        });
    } else if !grouped.volatile.is_empty() {
        // Has volatile content — 1h on last stable, 5m on last volatile
        let last_stable_idx = 1 + grouped.stable.len(); // offset by 1 for prefix
        if last_stable_idx > 1 && last_stable_idx <= blocks.len() {
            blocks[last_stable_idx - 1].cache_control = Some(CacheControl {
                cache_type: "ephemeral".into(),
                ttl: Some("1h".into()),
            });
        }
        // 5m on last volatile (last block)
        if let Some(last) = blocks.last_mut() {
            last.cache_control = Some(CacheControl {
                cache_type: "ephemeral".into(),
                ttl: None,
            });
        }
    } else if !grouped.stable.is_empty() {
        // Only stable content — 1h on last block
        if let Some(last) = blocks.last_mut() {
            last.cache_control = Some(CacheControl {
                cache_type: "ephemeral".into(),
                ttl: Some("1h".into()),
            });
        }
    }

    serde_json::to_value(&blocks).expect("SystemPromptBlock serialization")
}

/// Build system prompt for API key connections (plain string).
fn build_system_prompt_plain(context: &Context) -> Option<Value> {
    let parts = compose_context_parts(context);
    if parts.is_empty() {
        None
    } else {
        Some(Value::String(parts.join("\n\n")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Convert context tools to Anthropic format with optional cache control.
///
/// For OAuth: the last tool gets a 1h cache control breakpoint.
fn convert_tools(
    tools: &[loom_core::tools::Tool],
    is_oauth: bool,
) -> Vec<AnthropicTool> {
    let mut result: Vec<AnthropicTool> = tools
        .iter()
        .map(|t| AnthropicTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: serde_json::to_value(&t.parameters).unwrap_or_default(),
            cache_control: None,
        })
        .collect();

    // Breakpoint 1: Last tool gets 1h cache (OAuth only)
    if is_oauth {
        if let Some(last) = result.last_mut() {
            last.cache_control = Some(CacheControl {
                cache_type: "ephemeral".into(),
                ttl: Some("1h".into()),
            });
        }
    }

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
