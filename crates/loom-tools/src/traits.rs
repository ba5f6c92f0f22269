//! Core trait and subagent contract for the tool system.
//!
//! Defines [`LoomTool`] — the trait every tool implements — and the
//! [`SubagentSpawner`] dependency-injection trait the orchestrator's
//! subagent tracker is driven through. Concrete tools and a concrete
//! spawner live in the runtime/composition root, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use loom_core::tools::{LoomToolResult, Tool, ToolCategory};

use crate::errors::ToolError;

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: String,
    /// Session ID of the agent invoking this tool.
    pub session_id: String,
    /// Working directory for path resolution.
    pub working_directory: String,
    /// Cancellation token for cooperative cancellation.
    pub cancellation: CancellationToken,
    /// Current subagent nesting depth (0 = root agent).
    pub subagent_depth: u32,
    /// Maximum nesting depth allowed for spawning children.
    pub subagent_max_depth: u32,
}

/// The core trait every tool must implement.
///
/// Each tool provides a schema via [`definition()`](LoomTool::definition) —
/// sent to the LLM — and executes via [`execute()`](LoomTool::execute),
/// invoked with the JSON arguments the model supplied.
#[async_trait]
pub trait LoomTool: Send + Sync {
    /// Tool name — the exact string sent to/from the LLM.
    fn name(&self) -> &str;

    /// Tool category for grouping.
    fn category(&self) -> ToolCategory;

    /// Whether this tool requires user interaction (excluded from subagents).
    fn is_interactive(&self) -> bool {
        false
    }

    /// Whether execution stops the agent turn loop.
    fn stops_turn(&self) -> bool {
        false
    }

    /// Optional per-tool timeout in milliseconds.
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Generate the [`Tool`] schema for the LLM.
    fn definition(&self) -> Tool;

    /// Execute the tool with JSON arguments.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<LoomToolResult, ToolError>;
}

/// Configuration for spawning a subagent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentConfig {
    /// Task description for the subagent.
    pub task: String,
    /// Optional model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Working directory for the subagent.
    pub working_directory: String,
    /// Maximum turns before stopping.
    pub max_turns: u32,
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum nesting depth (0 = no children, 1 = one level, etc.).
    #[serde(default)]
    pub max_depth: u32,
    /// Current nesting depth (set by the spawner, not the caller).
    #[serde(default)]
    pub current_depth: u32,
}

/// Handle to a running or completed subagent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentHandle {
    /// Session ID of the subagent.
    pub session_id: String,
    /// Output (only present if blocking).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// How a subagent is actually spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubagentMode {
    /// Runs in-process as another session on the same orchestrator.
    InProcess,
    /// Runs as a separate process inside a tmux pane.
    Tmux,
}

/// Wait mode for a multi-subagent wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitMode {
    /// Wait for all agents to complete.
    All,
    /// Wait for any one agent to complete.
    Any,
}

/// Result from a completed subagent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentResult {
    /// Session ID.
    pub session_id: String,
    /// Output text.
    pub output: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Completion status (`completed` | `failed`).
    pub status: String,
}

/// Subagent spawning, used by `SpawnSubagent`-style tools and by the
/// orchestrator's own fan-out when it spawns subagents programmatically.
#[async_trait]
pub trait SubagentSpawner: Send + Sync {
    /// Spawn a new subagent and return immediately with its handle.
    async fn spawn(&self, config: SubagentConfig) -> Result<SubagentHandle, ToolError>;

    /// Wait for one or more subagents to reach a terminal state.
    ///
    /// `cancel` is the caller's run-level cancellation token, not any
    /// individual subagent's — if the parent run is aborted while this wait
    /// is in flight, it must resolve with [`ToolError::Cancelled`] rather
    /// than running out its own `timeout_ms`.
    async fn wait_for_agents(
        &self,
        session_ids: &[String],
        mode: WaitMode,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubagentResult>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_context_construction() {
        let ctx = ToolContext {
            tool_call_id: "call-1".into(),
            session_id: "sess-1".into(),
            working_directory: "/tmp".into(),
            cancellation: CancellationToken::new(),
            subagent_depth: 0,
            subagent_max_depth: 0,
        };
        assert_eq!(ctx.tool_call_id, "call-1");
        assert_eq!(ctx.subagent_depth, 0);
    }

    #[test]
    fn wait_mode_serde_roundtrip() {
        for mode in [WaitMode::All, WaitMode::Any] {
            let json = serde_json::to_string(&mode).unwrap();
            let back: WaitMode = serde_json::from_str(&json).unwrap();
            assert_eq!(mode, back);
        }
    }

    #[test]
    fn subagent_config_defaults_depth_to_zero() {
        let json = serde_json::json!({
            "task": "summarize",
            "workingDirectory": "/tmp",
            "maxTurns": 5,
            "timeoutMs": 30_000,
        });
        let cfg: SubagentConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.max_depth, 0);
        assert_eq!(cfg.current_depth, 0);
    }
}
