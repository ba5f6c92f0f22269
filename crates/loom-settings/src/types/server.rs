//! Server, agent, logging, hook, session, and tmux settings.
//!
//! These are grouped here because they are all relatively small and
//! server-oriented.

use serde::{Deserialize, Serialize};

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// WebSocket server port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Bind address.
    pub host: String,
    /// Optional Tailscale IP for network access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tailscale_ip: Option<String>,
    /// WebSocket heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Session inactivity timeout in milliseconds.
    pub session_timeout_ms: u64,
    /// Maximum number of concurrent sessions.
    pub max_concurrent_sessions: usize,
    /// Directory for session data (relative to `~/.loom`).
    pub sessions_dir: String,
    /// Path to the memory database (relative to `~/.loom`).
    pub memory_db_path: String,
    /// Default LLM model identifier.
    pub default_model: String,
    /// Default LLM provider.
    pub default_provider: String,
    /// Default workspace path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_workspace: Option<String>,
    /// Anthropic account label for multi-account selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_account: Option<String>,
    /// Audio transcription settings.
    pub transcription: TranscriptionSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8081,
            host: "0.0.0.0".to_string(),
            tailscale_ip: None,
            heartbeat_interval_ms: 30_000,
            session_timeout_ms: 1_800_000,
            max_concurrent_sessions: 10,
            sessions_dir: "sessions".to_string(),
            memory_db_path: "memory.db".to_string(),
            default_model: "claude-sonnet-4-20250514".to_string(),
            default_provider: "anthropic".to_string(),
            default_workspace: None,
            anthropic_account: None,
            transcription: TranscriptionSettings::default(),
        }
    }
}

/// Transcription cleanup mode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// No cleanup.
    None,
    /// Basic text normalization.
    #[default]
    Basic,
    /// LLM-powered cleanup.
    Llm,
}

/// Audio transcription settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionSettings {
    /// Whether transcription is enabled.
    pub enabled: bool,
    /// Whether to auto-manage the transcription sidecar process.
    pub manage_sidecar: bool,
    /// Base URL of the transcription service.
    pub base_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Post-transcription cleanup mode.
    pub cleanup_mode: CleanupMode,
    /// Maximum audio file size in bytes.
    pub max_bytes: u64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            manage_sidecar: true,
            base_url: "http://127.0.0.1:8787".to_string(),
            timeout_ms: 180_000,
            cleanup_mode: CleanupMode::Basic,
            max_bytes: 26_214_400,
        }
    }
}

/// Agent runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentRuntimeSettings {
    /// Maximum number of agentic turns per prompt.
    pub max_turns: u32,
    /// Timeout for inactive sessions in milliseconds.
    pub inactive_session_timeout_ms: u64,
}

impl Default for AgentRuntimeSettings {
    fn default() -> Self {
        Self {
            max_turns: 100,
            inactive_session_timeout_ms: 1_800_000,
        }
    }
}

/// Log level for database logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
    /// Fatal-level (least verbose).
    Fatal,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum log level written to the database.
    pub db_log_level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            db_log_level: LogLevel::Info,
        }
    }
}

/// Hook system configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Default timeout for hook execution in milliseconds.
    pub default_timeout_ms: u64,
    /// Timeout for hook discovery in milliseconds.
    pub discovery_timeout_ms: u64,
    /// Project-relative directory for hook scripts.
    pub project_dir: String,
    /// User-level directory for hook scripts.
    pub user_dir: String,
    /// Allowed hook script file extensions.
    pub extensions: Vec<String>,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            discovery_timeout_ms: 10_000,
            project_dir: ".agent/hooks".to_string(),
            user_dir: ".config/loom/hooks".to_string(),
            extensions: vec![
                ".ts".to_string(),
                ".js".to_string(),
                ".mjs".to_string(),
                ".sh".to_string(),
            ],
        }
    }
}

/// Tmux integration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TmuxSettings {
    /// Timeout for tmux commands in milliseconds.
    pub command_timeout_ms: u64,
    /// Polling interval for tmux state in milliseconds.
    pub polling_interval_ms: u64,
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            polling_interval_ms: 500,
        }
    }
}

/// Session behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Timeout for git worktree commands in milliseconds.
    pub worktree_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            worktree_timeout_ms: 30_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
