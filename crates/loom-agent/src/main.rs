//! # loom-agent
//!
//! Composition-root binary: loads settings, opens the event store, wires the
//! orchestrator together, and drives a single request-response loop reading
//! newline-delimited JSON requests from stdin. Intended for local
//! smoke-testing the runtime, not as a network-facing server — there is no
//! HTTP/WebSocket listener or RPC method registry here.

#![deny(unsafe_code)]

mod provider_factory;

use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use loom_events::{ConnectionConfig, EventStore};
use loom_hooks::engine::HookEngine;
use loom_hooks::registry::HookRegistry;
use loom_llm::provider::ProviderFactory;
use loom_runtime::agent::event_emitter::EventEmitter;
use loom_runtime::orchestrator::agent_factory::{AgentFactory, CreateAgentOpts};
use loom_runtime::orchestrator::agent_runner;
use loom_runtime::orchestrator::orchestrator::Orchestrator;
use loom_runtime::orchestrator::session_manager::SessionManager;
use loom_runtime::orchestrator::subagent_manager::SubagentManager;
use loom_runtime::types::{AgentConfig, RunContext, RunResult};
use loom_skills::registry::SkillRegistry;
use loom_tools::registry::ToolRegistry;
use loom_tools::traits::{LoomTool, SubagentSpawner, ToolContext};
use loom_worktree::{AcquireOptions, RealGitExecutor, WorktreeCoordinator};

/// Loom agent — local smoke-test binary.
#[derive(Parser, Debug)]
#[command(name = "loom-agent", about = "Loom agent runtime (stdin/stdout smoke test)")]
struct Cli {
    /// Path to the `SQLite` database (events + sessions in one file).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Working directory for the session (defaults to the current directory).
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home)
            .join(".loom")
            .join("database")
            .join("loom.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Map the settings crate's database log-level enum onto `loom-logging`'s own,
/// separately-defined but identically-shaped numeric scale.
fn db_log_level_num(level: &loom_settings::LogLevel) -> i32 {
    use loom_settings::LogLevel as SettingsLevel;
    match level {
        SettingsLevel::Trace => loom_logging::LogLevel::Trace.as_num(),
        SettingsLevel::Debug => loom_logging::LogLevel::Debug.as_num(),
        SettingsLevel::Info => loom_logging::LogLevel::Info.as_num(),
        SettingsLevel::Warn => loom_logging::LogLevel::Warn.as_num(),
        SettingsLevel::Error => loom_logging::LogLevel::Error.as_num(),
        SettingsLevel::Fatal => loom_logging::LogLevel::Fatal.as_num(),
    }
}

/// Resolve the auth file path (`~/.loom/auth.json`).
fn auth_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".loom").join("auth.json")
}

/// A single echo/no-op tool, standing in for the concrete tool surface this
/// composition root does not implement (file edit, shell, browser, HTTP).
struct EchoTool;

#[async_trait::async_trait]
impl LoomTool for EchoTool {
    fn name(&self) -> &str {
        "Echo"
    }

    fn category(&self) -> loom_core::tools::ToolCategory {
        loom_core::tools::ToolCategory::Custom
    }

    fn definition(&self) -> loom_core::tools::Tool {
        loom_core::tools::Tool {
            name: "Echo".into(),
            description: "Echoes back the `text` argument. Placeholder for real tools.".into(),
            parameters: loom_core::tools::ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some(serde_json::json!({"text": {"type": "string"}}).as_object().cloned().unwrap_or_default()),
                required: Some(vec!["text".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<loom_core::tools::LoomToolResult, loom_tools::errors::ToolError> {
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(loom_core::tools::text_result(text, false))
    }
}

fn create_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry
}

/// A single JSON request read from stdin, one per line.
#[derive(Debug, Deserialize)]
struct Request {
    /// Resume an existing session, or start a new one when absent.
    session_id: Option<String>,
    /// Model identifier (ignored when resuming).
    #[serde(default = "default_model")]
    model: String,
    /// User message content for this turn.
    prompt: String,
}

fn default_model() -> String {
    "claude-opus-4-6".to_string()
}

/// The JSON response written to stdout, one per line.
#[derive(Debug, Serialize)]
struct Response {
    session_id: String,
    result: RunResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let db_path = args.db_path.unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let db_str = db_path.to_string_lossy();
    let pool =
        loom_events::new_file(&db_str, &ConnectionConfig::default()).context("Failed to open database")?;
    {
        let conn = pool.get().context("Failed to get DB connection")?;
        let _ = loom_events::run_migrations(&conn).context("Failed to run event migrations")?;
    }

    let settings_path = loom_settings::loader::settings_path();
    let settings = loom_settings::loader::load_settings_from_path(&settings_path).unwrap_or_default();

    let log_conn = rusqlite::Connection::open(&*db_str).context("Failed to open log database")?;
    let log_config = loom_logging::TransportConfig {
        min_level: db_log_level_num(&settings.logging.db_log_level),
        ..loom_logging::TransportConfig::default()
    };
    let _log_handle = loom_logging::init_subscriber_with_sqlite(log_conn, log_config);

    let event_store = Arc::new(EventStore::new(pool));
    let session_manager = Arc::new(SessionManager::new(event_store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        session_manager.clone(),
        settings.server.max_concurrent_sessions,
    ));

    let working_dir = args
        .working_dir
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .to_string_lossy()
        .into_owned();

    let mut skills = SkillRegistry::new();
    skills.initialize(&working_dir);
    let skill_registry = Arc::new(RwLock::new(skills));

    let worktree_coordinator = Arc::new(WorktreeCoordinator::new(
        Arc::new(RealGitExecutor::default()),
        event_store.clone(),
        settings.worktrees.clone(),
    ));

    let provider_factory: Arc<dyn ProviderFactory> =
        Arc::new(provider_factory::DefaultProviderFactory::new(&settings));

    let subagent_manager = Arc::new(SubagentManager::new(
        session_manager.clone(),
        event_store.clone(),
        orchestrator.broadcast().clone(),
        provider_factory.clone(),
        None,
        Some(worktree_coordinator.clone()),
    ));
    let _spawner: Arc<dyn SubagentSpawner> = subagent_manager.clone();
    subagent_manager.set_tool_factory(Arc::new(create_tool_registry));

    tracing::info!(db = %db_path.display(), working_dir, "loom-agent ready, reading requests from stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse request, skipping");
                continue;
            }
        };

        let response = handle_request(
            &request,
            &working_dir,
            &session_manager,
            &provider_factory,
            &skill_registry,
            &worktree_coordinator,
        )
        .await;

        match response {
            Ok(resp) => {
                writeln!(stdout, "{}", serde_json::to_string(&resp)?)?;
                stdout.flush()?;
            }
            Err(e) => {
                tracing::error!(error = %e, "request failed");
                writeln!(stdout, "{}", serde_json::json!({"error": e.to_string()}))?;
                stdout.flush()?;
            }
        }
    }

    orchestrator.shutdown().await.ok();
    Ok(())
}

async fn handle_request(
    request: &Request,
    working_dir: &str,
    session_manager: &Arc<SessionManager>,
    provider_factory: &Arc<dyn ProviderFactory>,
    skill_registry: &Arc<RwLock<SkillRegistry>>,
    worktree_coordinator: &Arc<WorktreeCoordinator>,
) -> Result<Response> {
    let session_id = match &request.session_id {
        Some(sid) => sid.clone(),
        None => session_manager
            .create_session(&request.model, working_dir, None)
            .map_err(|e| anyhow::anyhow!("failed to create session: {e}"))?,
    };
    let active = session_manager
        .resume_session(&session_id)
        .map_err(|e| anyhow::anyhow!("failed to resume session: {e}"))?;
    let initial_messages = active.state.messages.clone();
    let model = active.state.model.clone();

    let working_directory = worktree_coordinator
        .acquire(&session_id, working_dir, AcquireOptions::default())
        .await
        .map(|wd| wd.path)
        .unwrap_or_else(|_| working_dir.to_string());

    let provider = provider_factory
        .create_for_model(&model)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create provider: {e}"))?;

    let registry = create_tool_registry();

    let skill_context = {
        let registry = skill_registry.read();
        let processed = loom_skills::injector::process_prompt_for_skills(&request.prompt, &registry);
        if processed.injected_skills.is_empty() {
            None
        } else {
            Some(processed.skill_context)
        }
    };

    let config = AgentConfig {
        model: model.clone(),
        working_directory: Some(working_directory),
        ..AgentConfig::default()
    };

    let hooks = Some(Arc::new(HookEngine::new(HookRegistry::new())));

    let mut agent = AgentFactory::create_agent(
        config,
        session_id.clone(),
        CreateAgentOpts {
            provider,
            tools: registry,
            hooks,
            is_subagent: false,
            denied_tools: Vec::new(),
            subagent_depth: 0,
            subagent_max_depth: 1,
            rules_content: None,
            initial_messages,
            memory_content: None,
            rules_index: None,
            pre_activated_rules: Vec::new(),
        },
    );
    agent.set_persister(Some(active.context.persister.clone()));

    let run_ctx = RunContext {
        skill_context,
        ..RunContext::default()
    };

    let broadcast = Arc::new(EventEmitter::new());
    let result = agent_runner::run_agent(&mut agent, &request.prompt, run_ctx, &None, &broadcast).await;

    Ok(Response {
        session_id,
        result,
    })
}
