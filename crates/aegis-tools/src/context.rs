//! `ToolContext` — the dependency bundle every internal tool is executed
//! against. Kept as its own trait (rather than depending on
//! `aegis-agent::MessageContext` directly) so `aegis-tools` has no
//! dependency on the agent crate; `aegis-agent`'s context implements this
//! trait to hand itself to tool dispatch.

use std::path::Path;

use aegis_kg::KnowledgeGraph;
use aegis_scheduler::SchedulerHandle;
use aegis_supervisor::Supervisor;
use aegis_terminal::{CommandPolicy, PathPolicy, TerminalManager};
use async_trait::async_trait;

use crate::audit::AuditSink;
use crate::skill::SkillEntry;

/// `{name, description}` pair for one registered tool, independent of which
/// server it came from. Populated from `registry::build_tools()` plus any
/// tool-server tools the supervisor has connected — used by
/// `introspection__get_tool_help` to return a tool's full, un-truncated
/// description (spec §4.E).
#[derive(Debug, Clone)]
pub struct ToolDoc {
    pub name: String,
    pub description: String,
}

/// Runs a rendered prompt-template message list through the agent loop and
/// returns the final text. Used by `introspection__execute_mcp_prompt`
/// (spec §4.E) without `aegis-tools` depending on `aegis-agent` — the same
/// trait-boundary idiom as `aegis_scheduler::UnitExecutor`.
#[async_trait]
pub trait PromptExecutor: Send + Sync {
    async fn run_messages(&self, messages: Vec<aegis_supervisor::PromptMessage>) -> Result<String, String>;
}

#[async_trait]
pub trait ToolContext: Send + Sync {
    fn path_policy(&self) -> &PathPolicy;
    fn command_policy(&self) -> &CommandPolicy;
    fn terminal(&self) -> &TerminalManager;
    fn knowledge_graph(&self) -> &KnowledgeGraph;
    fn scheduler(&self) -> &SchedulerHandle;
    fn schedule_file_path(&self) -> &Path;
    fn supervisor(&self) -> &tokio::sync::Mutex<Supervisor>;
    fn reports_dir(&self) -> &Path;
    /// Owned rather than borrowed: the skills list is reloaded in place
    /// when the installed-skills file changes (spec §4.H), so a context
    /// backed by a lock can't hand out a `&[SkillEntry]` into its guard.
    fn skills(&self) -> Vec<SkillEntry>;
    /// Root directory under which script-exec targets must resolve.
    fn skills_dir(&self) -> &Path;
    fn audit(&self) -> &dyn AuditSink;
    fn prompt_executor(&self) -> Option<&dyn PromptExecutor> {
        None
    }
    /// Raw lines of recent conversation transcript, most recent last, for
    /// `introspection__search_conversation_history`.
    fn conversation_history(&self) -> Vec<String> {
        Vec::new()
    }
    /// Every registered tool's full `{name, description}`, for
    /// `introspection__get_tool_help`.
    fn tool_catalog(&self) -> Vec<ToolDoc> {
        Vec::new()
    }
    /// Whether script execution is enabled at all (spec: "Disabled by
    /// default").
    fn script_exec_enabled(&self) -> bool {
        false
    }
    /// Prompt a human before a confirm-gated tool acts. Returns `true` if
    /// approved. A context with no interactive callback should return
    /// `false` (deny by default) rather than block forever.
    async fn confirm(&self, _tool_name: &str, _detail: &str) -> bool {
        false
    }
    /// Whether a user-confirmation callback is wired up at all (interactive
    /// mode). `execute_command` uses this to decide whether to impose a
    /// timeout (spec §4.E: "in interactive mode ... no timeout is imposed").
    fn has_confirm_callback(&self) -> bool {
        false
    }
    /// Set by `internal__trigger_synthesis` — merely flips a pending flag,
    /// per spec §4.E ("The last merely sets a pending flag on the agent").
    fn mark_synthesis_pending(&self, focus: Option<String>);
}

#[cfg(test)]
pub mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    use aegis_kg::KnowledgeGraph;
    use aegis_scheduler::SchedulerHandle;
    use aegis_supervisor::Supervisor;
    use aegis_terminal::{CommandPolicy, PathPolicy, TerminalManager};
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::audit::{AuditSink, TracingAuditSink};
    use crate::skill::SkillEntry;

    use super::ToolContext;

    /// Minimal in-memory `ToolContext` for unit tests across this crate.
    pub struct TestContext {
        pub path_policy: PathPolicy,
        pub command_policy: CommandPolicy,
        pub terminal: TerminalManager,
        pub kg: KnowledgeGraph,
        pub scheduler: SchedulerHandle,
        pub supervisor: tokio::sync::Mutex<Supervisor>,
        pub _tmp: TempDir,
        pub reports_dir: PathBuf,
        pub skills_dir: PathBuf,
        pub schedule_file_path: PathBuf,
        pub skills: Vec<SkillEntry>,
        pub audit: TracingAuditSink,
        pub script_exec_enabled: bool,
        pub confirm_result: bool,
        pub has_confirm_callback: bool,
        pub synthesis_pending: StdMutex<Option<Option<String>>>,
    }

    impl TestContext {
        pub fn unrestricted() -> Self {
            Self::new(PathPolicy::unrestricted(), CommandPolicy::new(vec![], vec![]))
        }

        pub fn restricted_to(root: &str) -> Self {
            Self::new(PathPolicy::new(vec![PathBuf::from(root)]), CommandPolicy::new(vec![], vec![]))
        }

        pub fn with_command_policy(allowed: Vec<&str>, confirm: Vec<&str>) -> Self {
            Self::new(
                PathPolicy::unrestricted(),
                CommandPolicy::new(
                    allowed.into_iter().map(String::from).collect(),
                    confirm.into_iter().map(String::from).collect(),
                ),
            )
        }

        fn new(path_policy: PathPolicy, command_policy: CommandPolicy) -> Self {
            let tmp = TempDir::new().unwrap();
            let reports_dir = tmp.path().join("reports");
            let skills_dir = tmp.path().join("skills");
            std::fs::create_dir_all(&reports_dir).unwrap();
            std::fs::create_dir_all(&skills_dir).unwrap();
            Self {
                path_policy,
                command_policy,
                terminal: TerminalManager::new(),
                kg: KnowledgeGraph::open_in_memory().unwrap(),
                scheduler: SchedulerHandle::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap(),
                supervisor: tokio::sync::Mutex::new(Supervisor::new()),
                schedule_file_path: tmp.path().join("schedule.json"),
                reports_dir,
                skills_dir,
                skills: Vec::new(),
                audit: TracingAuditSink,
                script_exec_enabled: false,
                confirm_result: false,
                has_confirm_callback: false,
                synthesis_pending: StdMutex::new(None),
                _tmp: tmp,
            }
        }
    }

    #[async_trait]
    impl ToolContext for TestContext {
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
        fn schedule_file_path(&self) -> &std::path::Path {
            &self.schedule_file_path
        }
        fn supervisor(&self) -> &tokio::sync::Mutex<Supervisor> {
            &self.supervisor
        }
        fn reports_dir(&self) -> &std::path::Path {
            &self.reports_dir
        }
        fn skills(&self) -> Vec<SkillEntry> {
            self.skills.clone()
        }
        fn skills_dir(&self) -> &std::path::Path {
            &self.skills_dir
        }
        fn audit(&self) -> &dyn AuditSink {
            &self.audit
        }
        fn script_exec_enabled(&self) -> bool {
            self.script_exec_enabled
        }
        async fn confirm(&self, _tool_name: &str, _detail: &str) -> bool {
            self.confirm_result
        }
        fn has_confirm_callback(&self) -> bool {
            self.has_confirm_callback
        }
        fn mark_synthesis_pending(&self, focus: Option<String>) {
            *self.synthesis_pending.lock().unwrap() = Some(focus);
        }
    }
}
