//! Wires every collaborator crate into one concrete `ToolContext` +
//! `MessageContext` implementation (spec §6 "the binary ties the engine's
//! crates together"). Structurally this is the real-persistence twin of
//! `aegis_tools::context::tests::TestContext` — same field shape, real
//! files/databases instead of a `TempDir`.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use aegis_agent::provider::LlmProvider;
use aegis_agent::{AgentRuntime, MessageContext, PromptBuilder};
use aegis_core::AegisConfig;
use aegis_kg::KnowledgeGraph;
use aegis_scheduler::SchedulerHandle;
use aegis_security::ToolDefinitionRegistry;
use aegis_supervisor::{ServerSpec, Supervisor};
use aegis_terminal::{CommandPolicy, PathPolicy, TerminalManager};
use aegis_tools::audit::AuditSink;
use aegis_tools::context::ToolContext;
use aegis_tools::context::PromptExecutor;
use aegis_tools::skill::{load_skills, SkillEntry};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::audit::JsonlAuditSink;
use crate::error::{CliError, Result};
use crate::notify::{LogNotifier, NotificationSink};

/// Everything one invocation of the binary needs, built once in `main`.
pub struct AppContext {
    config: AegisConfig,
    path_policy: PathPolicy,
    command_policy: CommandPolicy,
    terminal: TerminalManager,
    kg: KnowledgeGraph,
    scheduler: SchedulerHandle,
    supervisor: tokio::sync::Mutex<Supervisor>,
    reports_dir: PathBuf,
    skills_dir: PathBuf,
    schedule_file_path: PathBuf,
    skills: StdMutex<Vec<SkillEntry>>,
    audit: JsonlAuditSink,
    script_exec_enabled: bool,
    interactive: bool,
    synthesis_pending: StdMutex<Option<Option<String>>>,
    tool_definition_registry: StdMutex<ToolDefinitionRegistry>,
    agent: AgentRuntime,
    notifier: Box<dyn NotificationSink>,
    /// Set once, after construction, to an executor closing over this same
    /// context's own `Arc` (see `install_prompt_executor`) — a plain field
    /// can't hold that without the struct owning an `Arc` to itself.
    prompt_executor_slot: OnceCell<Box<dyn PromptExecutor>>,
}

impl AppContext {
    pub async fn build(config: AegisConfig, interactive: bool) -> Result<Self> {
        std::fs::create_dir_all(&config.paths.config_dir)?;
        std::fs::create_dir_all(&config.paths.reports_dir)?;
        std::fs::create_dir_all(config.paths.skills_dir())?;

        let path_policy = if config.security.allowed_paths.is_empty() {
            PathPolicy::unrestricted()
        } else {
            PathPolicy::new(config.security.allowed_paths.iter().map(PathBuf::from).collect())
        };
        let command_policy =
            CommandPolicy::new(config.security.allowed_commands.clone(), config.security.confirm_tools.clone());

        let kg = KnowledgeGraph::open(&config.paths.kg_path())?;

        let scheduler_conn = rusqlite::Connection::open(scheduler_db_path(&config))
            .map_err(|e| CliError::Other(format!("failed to open scheduler database: {e}")))?;
        let scheduler = SchedulerHandle::new(scheduler_conn)?;

        let mut supervisor = Supervisor::new();
        let specs = load_server_specs(&config.paths.mcp_spec_path());
        if !specs.is_empty() {
            let outcomes = supervisor.connect_all(specs).await;
            for outcome in outcomes {
                if outcome.ok {
                    info!(server = %outcome.server, "tool server connected");
                } else {
                    warn!(server = %outcome.server, error = ?outcome.error, "tool server failed to connect");
                }
            }
        }

        let skills_dir = PathBuf::from(config.paths.skills_dir());
        let skills = load_skills(&skills_dir, &skills_dir);

        let audit = JsonlAuditSink::open(config.paths.audit_log_path())?;
        audit.cleanup();

        let provider = build_provider(&config)?;
        let prompt = PromptBuilder::load(None, None);
        let agent = AgentRuntime::new(provider, prompt, config.agent.model.clone());

        Ok(Self {
            reports_dir: PathBuf::from(&config.paths.reports_dir),
            schedule_file_path: PathBuf::from(config.paths.schedule_path()),
            script_exec_enabled: config.features.allow_script_execution,
            path_policy,
            command_policy,
            terminal: TerminalManager::new(),
            kg,
            scheduler,
            supervisor: tokio::sync::Mutex::new(supervisor),
            skills_dir,
            skills: StdMutex::new(skills),
            audit,
            interactive,
            synthesis_pending: StdMutex::new(None),
            tool_definition_registry: StdMutex::new(ToolDefinitionRegistry::new()),
            agent,
            notifier: Box::new(LogNotifier),
            prompt_executor_slot: OnceCell::new(),
            config,
        })
    }

    pub fn config(&self) -> &AegisConfig {
        &self.config
    }

    pub fn notifier(&self) -> &dyn NotificationSink {
        &*self.notifier
    }

    /// Wires `introspection__execute_mcp_prompt` up to a real agent turn.
    /// Called once from `main` with the same `Arc<AppContext>` it hands to
    /// every other entry point; a no-op if already installed.
    pub fn install_prompt_executor(&self, executor: Box<dyn PromptExecutor>) {
        let _ = self.prompt_executor_slot.set(executor);
    }

    /// Drains and clears the synthesis-pending flag set by
    /// `internal__trigger_synthesis`, for `/monitor`'s nightly-synthesis
    /// reconciliation loop.
    pub fn take_synthesis_pending(&self) -> Option<Option<String>> {
        self.synthesis_pending.lock().unwrap().take()
    }

    /// Re-scan `skills_dir` and replace the installed-skills list in place —
    /// the installed-skills-list reaction of spec §4.H.
    pub fn reload_skills(&self) {
        let fresh = load_skills(&self.skills_dir, &self.skills_dir);
        *self.skills.lock().unwrap() = fresh;
        info!("installed skills reloaded");
    }

    /// Re-diff the MCP server spec file against the live supervisor — the
    /// MCP-spec-file reaction of spec §4.H.
    pub async fn reload_mcp_specs(&self) {
        let specs = load_server_specs(&self.config.paths.mcp_spec_path());
        let outcomes = self.supervisor.lock().await.reload_from_spec(specs).await;
        for outcome in outcomes {
            if outcome.ok {
                info!(server = %outcome.server, "tool server reloaded from spec change");
            } else {
                warn!(server = %outcome.server, error = ?outcome.error, "tool server reload failed");
            }
        }
    }
}

/// Install the three file watchers spec §4.H requires beyond the schedule
/// file (which `commands::monitor` wires separately, into its own restart
/// loop rather than a simple reload callback). The returned `WatchSet` must
/// be kept alive for the rest of the process; dropping it tears the watches
/// down.
pub fn start_file_watchers(ctx: Arc<AppContext>) -> aegis_watch::WatchSet {
    let mut watches = aegis_watch::WatchSet::new();

    let mcp_ctx = Arc::clone(&ctx);
    watches.watch(
        ctx.config.paths.mcp_spec_path(),
        Arc::new(move || {
            let ctx = Arc::clone(&mcp_ctx);
            Box::pin(async move { ctx.reload_mcp_specs().await })
        }),
    );

    let identity_ctx = Arc::clone(&ctx);
    watches.watch(
        ctx.config.paths.identity_path(),
        Arc::new(move || {
            let ctx = Arc::clone(&identity_ctx);
            Box::pin(async move { ctx.agent.reload_identity().await })
        }),
    );

    let skills_ctx = Arc::clone(&ctx);
    watches.watch(
        ctx.config.paths.installed_skills_path(),
        Arc::new(move || {
            let ctx = Arc::clone(&skills_ctx);
            Box::pin(async move { ctx.reload_skills() })
        }),
    );

    watches
}

/// The scheduler keeps its own SQLite file, separate from the knowledge
/// graph's — `aegis-scheduler` exposes only `SchedulerHandle::new(Connection)`,
/// never a path, so this binary owns the naming convention.
pub fn scheduler_db_path(config: &AegisConfig) -> String {
    format!("{}/scheduler.db", config.paths.config_dir)
}

fn build_provider(config: &AegisConfig) -> Result<Box<dyn LlmProvider>> {
    if let Some(anthropic) = &config.providers.anthropic {
        return Ok(Box::new(aegis_agent::anthropic::AnthropicProvider::new(
            anthropic.api_key.clone(),
            Some(anthropic.base_url.clone()),
        )));
    }
    if let Some(openai) = &config.providers.openai {
        return Ok(Box::new(aegis_agent::openai::OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        )));
    }
    Err(CliError::Other(
        "no LLM provider configured: set [providers.anthropic] or [providers.openai] in aegis.toml".to_string(),
    ))
}

fn load_server_specs(path: &str) -> HashMap<String, ServerSpec> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_json::from_str(&contents) {
        Ok(specs) => specs,
        Err(e) => {
            warn!(path, error = %e, "failed to parse MCP server spec file, starting with no tool servers");
            HashMap::new()
        }
    }
}

#[async_trait]
impl ToolContext for AppContext {
    fn path_policy(&self) -> &PathPolicy {
        &self.path_policy
    }
    fn command_policy(&self) -> &CommandPolicy {
        &self.command_policy
    }
    fn terminal(&self) -> &TerminalManager {
        &self.terminal
    }
    fn knowledge_graph(&self) -> &KnowledgeGraph {
        &self.kg
    }
    fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }
    fn schedule_file_path(&self) -> &Path {
        &self.schedule_file_path
    }
    fn supervisor(&self) -> &tokio::sync::Mutex<Supervisor> {
        &self.supervisor
    }
    fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }
    fn skills(&self) -> Vec<SkillEntry> {
        self.skills.lock().unwrap().clone()
    }
    fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }
    fn audit(&self) -> &dyn AuditSink {
        &self.audit
    }
    fn prompt_executor(&self) -> Option<&dyn PromptExecutor> {
        self.prompt_executor_slot.get().map(|b| b.as_ref())
    }
    fn script_exec_enabled(&self) -> bool {
        self.script_exec_enabled
    }
    async fn confirm(&self, tool_name: &str, detail: &str) -> bool {
        if !self.interactive {
            return false;
        }
        print!("Allow {tool_name} to proceed? [{detail}] (y/N): ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
    fn has_confirm_callback(&self) -> bool {
        self.interactive
    }
    fn mark_synthesis_pending(&self, focus: Option<String>) {
        *self.synthesis_pending.lock().unwrap() = Some(focus);
    }
}

impl MessageContext for AppContext {
    fn agent(&self) -> &AgentRuntime {
        &self.agent
    }
    fn tool_definition_registry(&self) -> &StdMutex<ToolDefinitionRegistry> {
        &self.tool_definition_registry
    }
    fn operator_opted_in_extended_context(&self) -> bool {
        self.config.features.allow_extended_context
    }
}
