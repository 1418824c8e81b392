//! Wires a scheduled unit's body into one non-streaming turn of the agent
//! loop (spec §4.G: "a unit's body is handed to the agent as a synthetic
//! user message"). Kept as a thin adapter over `aegis_agent::pipeline`, the
//! same trait-boundary idiom `aegis_tools::context::PromptExecutor` uses for
//! `introspection__execute_mcp_prompt`.

use std::sync::Arc;

use aegis_agent::pipeline::process_message_non_streaming;
use aegis_scheduler::{ScheduleUnit, TaskResult, UnitExecutor};
use aegis_supervisor::PromptMessage;
use aegis_tools::context::PromptExecutor;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::app::AppContext;

pub struct AgentUnitExecutor {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl UnitExecutor for AgentUnitExecutor {
    async fn execute(&self, unit: &ScheduleUnit) -> TaskResult {
        let max_tokens = self.ctx.config().agent.max_tokens;
        let result = process_message_non_streaming(Arc::clone(&self.ctx), &unit.body, None, max_tokens).await;
        match result {
            Ok(msg) => TaskResult {
                unit_name: unit.name.clone(),
                success: true,
                output: msg.content,
                metadata: json!({"model": msg.model, "tokens_in": msg.tokens_in, "tokens_out": msg.tokens_out}),
                ran_at: Utc::now(),
            },
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "scheduled unit run failed");
                TaskResult {
                    unit_name: unit.name.clone(),
                    success: false,
                    output: e.to_string(),
                    metadata: json!({}),
                    ran_at: Utc::now(),
                }
            }
        }
    }
}

/// Renders an MCP prompt's message list through one non-streaming agent
/// turn and returns the final text, backing
/// `introspection__execute_mcp_prompt` without `aegis-tools` depending on
/// `aegis-agent`.
pub struct AgentPromptExecutor {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl PromptExecutor for AgentPromptExecutor {
    async fn run_messages(&self, messages: Vec<PromptMessage>) -> Result<String, String> {
        let combined = messages
            .into_iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let max_tokens = self.ctx.config().agent.max_tokens;
        process_message_non_streaming(Arc::clone(&self.ctx), &combined, None, max_tokens)
            .await
            .map(|msg| msg.content)
            .map_err(|e| e.to_string())
    }
}
