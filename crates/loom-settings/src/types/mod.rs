//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the TypeScript
//! JSON wire format. Each type implements [`Default`] with production default
//! values. Types marked with `#[serde(default)]` allow partial JSON — missing
//! fields get their default value during deserialization.

mod api;
mod context;
mod server;
mod tools;
mod ui;
mod worktree;

pub use api::*;
pub use context::*;
pub use server::*;
pub use tools::*;
pub use ui::*;
pub use worktree::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the Loom agent.
///
/// Loaded from `~/.loom/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// # JSON Format
///
/// All field names are camelCase. Optional sections (`guardrails`) are
/// omitted when `None`. Example:
///
/// ```json
/// {
///   "version": "0.1.0",
///   "name": "loom",
///   "server": { "wsPort": 9090 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoomSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// API provider settings (Anthropic, `OpenAI`, Google).
    pub api: ApiSettings,
    /// Default model selection.
    pub models: ModelSettings,
    /// Retry configuration for API calls.
    pub retry: RetrySettings,
    /// Tool-specific settings.
    pub tools: ToolSettings,
    /// Context management settings (compaction, memory, rules, tasks).
    pub context: ContextSettings,
    /// Agent runtime settings (max turns, timeouts).
    pub agent: AgentRuntimeSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Hook system configuration.
    pub hooks: HookSettings,
    /// Server network settings.
    pub server: ServerSettings,
    /// Tmux integration settings.
    pub tmux: TmuxSettings,
    /// Session behavior settings.
    pub session: SessionSettings,
    /// UI/TUI appearance settings.
    pub ui: UiSettings,
    /// Worktree isolation settings.
    pub worktrees: WorktreeSettings,
}

impl Default for LoomSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "loom".to_string(),
            api: ApiSettings::default(),
            models: ModelSettings::default(),
            retry: RetrySettings::default(),
            tools: ToolSettings::default(),
            context: ContextSettings::default(),
            agent: AgentRuntimeSettings::default(),
            logging: LoggingSettings::default(),
            hooks: HookSettings::default(),
            server: ServerSettings::default(),
            tmux: TmuxSettings::default(),
            session: SessionSettings::default(),
            ui: UiSettings::default(),
            worktrees: WorktreeSettings::default(),
        }
    }
}

/// Default model selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Default model for main conversations.
    #[serde(rename = "default")]
    pub default_model: String,
    /// Default model for skill sub-agents.
    pub subagent: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_model: "claude-opus-4-6".to_string(),
            subagent: "claude-haiku-4-5-20251001".to_string(),
        }
    }
}

/// Retry configuration for API calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0–1.0) applied to retry delays.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_factor: 0.2,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
