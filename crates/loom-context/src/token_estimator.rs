//! Token estimation utilities.
//!
//! Pure functions for estimating token counts from text, messages, tools,
//! and images. Uses a chars/4 approximation consistent with Anthropic's
//! tokenizer.
//!
//! ## Formula
//!
//! - Text content: `tokens ≈ characters / 4`
//! - Images (Anthropic): `tokens = (width × height) / 750`
//!   - Pixels estimated from base64 data size
//!   - Minimum 85 tokens per image
//!   - Default 1500 tokens for URL images (typical 1024×1024)

use serde_json::Value;
use loom_core::content::{AssistantContent, ToolResultContent, UserContent};
use loom_core::messages::{Message, ToolResultMessageContent, UserMessageContent};
use loom_core::tools::Tool;

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_URL_IMAGE_TOKENS, MIN_IMAGE_TOKENS, RULES_HEADER};

/// Shorthand for chars → tokens conversion.
#[allow(clippy::cast_possible_truncation)]
fn chars_to_tokens(chars: usize) -> u32 {
    chars.div_ceil(CHARS_PER_TOKEN as usize) as u32
}

// ─────────────────────────────────────────────────────────────────────────────
// Image Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Image source for token estimation.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Base64-encoded image data.
    Base64 {
        /// Raw base64 string (no data: prefix).
        data: String,
    },
    /// URL-referenced image.
    Url {
        /// Image URL.
        url: String,
    },
}

/// Estimate tokens for an image.
///
/// For base64 images, estimates dimensions from data size:
/// - Base64 overhead is ~33%, so actual bytes = length × 0.75
/// - Uses compression ratio of 5 for mixed content
/// - Minimum 85 tokens per image
///
/// For URL images, uses a conservative default (1500 tokens for ~1024×1024).
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_image_tokens(source: Option<&ImageSource>) -> u32 {
    match source {
        Some(ImageSource::Base64 { data }) => {
            let data_length = data.len() as f64;
            let estimated_bytes = data_length * 0.75;
            let estimated_pixels = estimated_bytes * 5.0;
            let tokens = (estimated_pixels / 750.0).ceil() as u32;
            tokens.max(MIN_IMAGE_TOKENS)
        }
        Some(ImageSource::Url { .. }) | None => DEFAULT_URL_IMAGE_TOKENS,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate character count for a content block (internal helper).
///
/// Avoids precision loss from double conversion by working in chars.
fn estimate_block_chars(block: &Value) -> usize {
    let Some(obj) = block.as_object() else {
        return 0;
    };

    let block_type = obj.get("type").and_then(Value::as_str).unwrap_or("");

    match block_type {
        "text" => obj.get("text").and_then(Value::as_str).map_or(0, str::len),

        "thinking" => obj
            .get("thinking")
            .and_then(Value::as_str)
            .map_or(0, str::len),

        "tool_use" => {
            let mut chars = 0usize;
            if let Some(id) = obj.get("id").and_then(Value::as_str) {
                chars += id.len();
            }
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                chars += name.len();
            }
            let empty_obj = Value::Object(serde_json::Map::new());
            let input = obj.get("arguments").unwrap_or(&empty_obj);
            chars += input.to_string().len();
            chars
        }

        "tool_result" => {
            let mut chars = 0usize;
            if let Some(id) = obj.get("tool_use_id").and_then(Value::as_str) {
                chars += id.len();
            }
            if let Some(content) = obj.get("content").and_then(Value::as_str) {
                chars += content.len();
            }
            chars
        }

        "image" => {
            let source = obj.get("source").and_then(|s| {
                let src_type = s.get("type").and_then(Value::as_str)?;
                match src_type {
                    "base64" => {
                        s.get("data")
                            .and_then(Value::as_str)
                            .map(|d| ImageSource::Base64 {
                                data: d.to_string(),
                            })
                    }
                    _ => None,
                }
            });
            let tokens = estimate_image_tokens(source.as_ref());
            (tokens * CHARS_PER_TOKEN) as usize
        }

        // Unknown type — fall back to JSON serialization
        _ => block.to_string().len(),
    }
}

/// Estimate tokens for a content block.
///
/// Handles text, thinking, tool\_use, tool\_result, and image blocks.
#[must_use]
pub fn estimate_block_tokens(block: &Value) -> u32 {
    chars_to_tokens(estimate_block_chars(block))
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed Content Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate character count for a [`UserContent`] block.
fn estimate_user_content_chars(content: &UserContent) -> usize {
    match content {
        UserContent::Text { text } => text.len(),
        UserContent::Image { data, .. } => {
            let source = ImageSource::Base64 { data: data.clone() };
            let tokens = estimate_image_tokens(Some(&source));
            (tokens * CHARS_PER_TOKEN) as usize
        }
        UserContent::Document { data, .. } => data.len(),
    }
}

/// Estimate character count for an [`AssistantContent`] block.
fn estimate_assistant_content_chars(content: &AssistantContent) -> usize {
    match content {
        AssistantContent::Text { text } => text.len(),
        AssistantContent::Thinking { thinking, .. } => thinking.len(),
        AssistantContent::ToolUse {
            id,
            name,
            arguments,
            ..
        } => {
            let args_str = serde_json::to_string(arguments).unwrap_or_default();
            id.len() + name.len() + args_str.len()
        }
    }
}

/// Estimate character count for a [`ToolResultContent`] block.
fn estimate_tool_result_content_chars(content: &ToolResultContent) -> usize {
    match content {
        ToolResultContent::Text { text } => text.len(),
        ToolResultContent::Image { data, .. } => {
            let source = ImageSource::Base64 { data: data.clone() };
            let tokens = estimate_image_tokens(Some(&source));
            (tokens * CHARS_PER_TOKEN) as usize
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate tokens for a single message.
///
/// Includes overhead for role and message structure (~10 chars).
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let role_str = match message {
        Message::User { .. } => "user",
        Message::Assistant { .. } => "assistant",
        Message::ToolResult { .. } => "toolResult",
    };
    let mut chars = role_str.len() + 10;

    match message {
        Message::User { content, .. } => match content {
            UserMessageContent::Text(text) => chars += text.len(),
            UserMessageContent::Blocks(blocks) => {
                for block in blocks {
                    chars += estimate_user_content_chars(block);
                }
            }
        },
        Message::Assistant { content, .. } => {
            for block in content {
                chars += estimate_assistant_content_chars(block);
            }
        }
        Message::ToolResult {
            tool_call_id,
            content,
            ..
        } => {
            chars += tool_call_id.len();
            match content {
                ToolResultMessageContent::Text(text) => chars += text.len(),
                ToolResultMessageContent::Blocks(blocks) => {
                    for block in blocks {
                        chars += estimate_tool_result_content_chars(block);
                    }
                }
            }
        }
    }

    chars_to_tokens(chars)
}

/// Estimate tokens for an array of messages.
#[must_use]
pub fn estimate_messages_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// System & Tools Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate tokens for the system prompt.
///
/// Optionally includes a tool clarification message (for Codex providers).
#[must_use]
pub fn estimate_system_prompt_tokens(system_prompt: &str, tool_clarification: Option<&str>) -> u32 {
    let total_length = system_prompt.len() + tool_clarification.map_or(0, str::len);
    chars_to_tokens(total_length)
}

/// Estimate tokens for tool definitions.
#[must_use]
pub fn estimate_tools_tokens(tools: &[Tool]) -> u32 {
    let total_chars: usize = tools
        .iter()
        .map(|t| serde_json::to_string(t).map_or(0, |s| s.len()))
        .sum();
    chars_to_tokens(total_chars)
}

/// Estimate tokens for rules content.
///
/// Includes header overhead (`"# Project Rules\n\n"`, 18 chars).
#[must_use]
pub fn estimate_rules_tokens(rules_content: Option<&str>) -> u32 {
    match rules_content {
        Some(content) if !content.is_empty() => chars_to_tokens(content.len() + RULES_HEADER.len()),
        _ => 0,
    }
}

/// Estimate tokens for system prompt and tools combined.
#[must_use]
pub fn estimate_system_tokens(system_prompt: &str, tools: &[Tool]) -> u32 {
    let mut chars = system_prompt.len();
    for tool in tools {
        chars += serde_json::to_string(tool).map_or(0, |s| s.len());
    }
    chars_to_tokens(chars)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
