//! `aegis-tools` — the internal tool set dispatched in-process under the
//! reserved server names `introspection`/`internal` (spec §4.E). These tools
//! bypass the tool-server supervisor entirely; they're Rust functions called
//! directly by the agent loop.
//!
//! Grounding: the `Tool` trait and per-tool-per-file layout come from
//! `skynet-agent::tools::{mod,read_file,search_files,execute_command,
//! knowledge,skill,script_tool}`. Everything here is generalized to the
//! spec's exact contracts — 15 KB read caps, regex search, allow-list-gated
//! command execution, report formats, KG query tools, schedule CRUD, and the
//! audit sink with secret redaction.

pub mod audit;
pub mod context;
pub mod error;
pub mod filesystem;
pub mod introspection;
pub mod knowledge;
pub mod kg_query;
pub mod registry;
pub mod report;
pub mod schedule_action;
pub mod schedule_tools;
pub mod script_exec;
pub mod skill;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: format!("Error: {}", message.into()), is_error: true }
    }
}

/// Trait every internal tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// Full description, used by `introspection__get_tool_help`.
    fn description(&self) -> &str;
    /// Optional short description for the progressive tool list (spec
    /// §4.F "Progressive tool descriptions"). Defaults to `None`, in which
    /// case the caller derives one from `description()`.
    fn short_description(&self) -> Option<&str> {
        None
    }
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, ctx: &dyn context::ToolContext, input: serde_json::Value) -> ToolResult;
}

pub use audit::AuditSink;
pub use context::{PromptExecutor, ToolContext};
pub use error::{Result, ToolError};
pub use registry::build_tools;
