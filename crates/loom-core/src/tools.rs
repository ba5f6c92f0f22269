//! Tool definition and result types.
//!
//! Defines the schema for tools that the agent can invoke, plus the result
//! type returned by tool execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ToolResultContent;

// ─────────────────────────────────────────────────────────────────────────────
// Tool schema
// ─────────────────────────────────────────────────────────────────────────────

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Description of the schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Catch-all for additional JSON Schema properties.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A tool definition that can be sent to the LLM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: ToolParameterSchema,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool result
// ─────────────────────────────────────────────────────────────────────────────

/// Content in a tool result — either a plain string or structured content blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultBody {
    /// Plain text result.
    Text(String),
    /// Structured content blocks (text + images).
    Blocks(Vec<ToolResultContent>),
}

/// Result of a tool execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoomToolResult {
    /// The tool output content.
    pub content: ToolResultBody,
    /// Optional structured details (tool-specific metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether the execution resulted in an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// If true, stops the agent turn loop immediately after this tool executes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_turn: Option<bool>,
}

/// Tool category for grouping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// File system operations.
    Filesystem,
    /// Shell/command execution.
    Shell,
    /// Search operations.
    Search,
    /// Network/HTTP operations.
    Network,
    /// Custom/user-defined.
    Custom,
}

/// Execution contract: how the tool expects to be invoked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionContract {
    /// Legacy: `execute(tool_call_id, params, signal)`.
    Contextual,
    /// Structured: `execute(params, options)`.
    Options,
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Create a simple text result.
#[must_use]
pub fn text_result(text: impl Into<String>, is_error: bool) -> LoomToolResult {
    LoomToolResult {
        content: ToolResultBody::Blocks(vec![ToolResultContent::text(text)]),
        details: None,
        is_error: if is_error { Some(true) } else { None },
        stop_turn: None,
    }
}

/// Create an error result.
#[must_use]
pub fn error_result(message: impl Into<String>) -> LoomToolResult {
    text_result(message, true)
}

/// Create an image result with optional caption.
#[must_use]
pub fn image_result(
    data: impl Into<String>,
    mime_type: impl Into<String>,
    caption: Option<&str>,
) -> LoomToolResult {
    let mut blocks: Vec<ToolResultContent> = Vec::new();
    if let Some(cap) = caption {
        blocks.push(ToolResultContent::text(cap));
    }
    blocks.push(ToolResultContent::image(data, mime_type));
    LoomToolResult {
        content: ToolResultBody::Blocks(blocks),
        details: None,
        is_error: None,
        stop_turn: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
