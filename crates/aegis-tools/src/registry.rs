//! Assembles the full internal tool catalog and dispatches calls against
//! it with audit logging, mirroring the teacher's `tools::to_definitions`/
//! catalog helpers generalized to this crate's full tool family (spec
//! §4.E).

use crate::audit::make_record;
use crate::context::{ToolContext, ToolDoc};
use crate::filesystem::{
    CreateDirectoryTool, ExecuteCommandTool, GetCurrentTimeTool, GetTodayDateTool, ListDirectoryTool, ReadFileTool,
    SearchInFileTool,
};
use crate::introspection::{
    ExecuteMcpPromptTool, GetKgEntityTool, GetKgStatsTool, GetToolHelpTool, InspectMcpPromptTool,
    SearchConversationHistoryTool, SearchKnowledgeGraphTool,
};
use crate::knowledge::{SaveKnowledgeTool, SearchKnowledgeTool, TriggerSynthesisTool};
use crate::kg_query::{DiscoveryLagStatsTool, EntityContextTool, KgStatsTool, LateDiscoveriesTool, RecentChangesTool};
use crate::report::ReportTool;
use crate::schedule_action::ScheduleActionTool;
use crate::schedule_tools::ScheduleTool;
use crate::script_exec::ScriptExecTool;
use crate::skill::SkillReadTool;
use crate::{Tool, ToolResult};

const MAX_SHORT_DESCRIPTION_CHARS: usize = 200;

/// Build the full internal tool catalog in one shot. Tool-server tools
/// (spec §4.A) are separate — those come from `Supervisor::all_tools` and
/// are dispatched through the Supervisor, not this registry.
pub fn build_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ReadFileTool),
        Box::new(SearchInFileTool),
        Box::new(ListDirectoryTool),
        Box::new(CreateDirectoryTool),
        Box::new(ExecuteCommandTool),
        Box::new(GetTodayDateTool),
        Box::new(GetCurrentTimeTool),
        Box::new(ReportTool),
        Box::new(SaveKnowledgeTool),
        Box::new(SearchKnowledgeTool),
        Box::new(TriggerSynthesisTool),
        Box::new(RecentChangesTool),
        Box::new(LateDiscoveriesTool),
        Box::new(DiscoveryLagStatsTool),
        Box::new(EntityContextTool),
        Box::new(KgStatsTool),
        Box::new(ScheduleTool),
        Box::new(ScheduleActionTool),
        Box::new(ScriptExecTool),
        Box::new(SearchKnowledgeGraphTool),
        Box::new(GetKgEntityTool),
        Box::new(GetKgStatsTool),
        Box::new(SearchConversationHistoryTool),
        Box::new(InspectMcpPromptTool),
        Box::new(ExecuteMcpPromptTool),
        Box::new(GetToolHelpTool),
        Box::new(SkillReadTool),
    ]
}

/// `ToolDoc` catalog for `get_tool_help` / `tool_catalog()`, derived from
/// whatever tool list the caller assembled (internal tools plus, typically,
/// any connected tool-server's `all_tools()`).
pub fn tool_docs(tools: &[Box<dyn Tool>]) -> Vec<ToolDoc> {
    tools
        .iter()
        .map(|t| ToolDoc { name: t.name().to_string(), description: t.description().to_string() })
        .collect()
}

/// The truncated-at-first-sentence, ≤200-char form sent to the chat
/// backend's tool list (spec §4.F "Progressive tool descriptions"),
/// pointing at `get_tool_help` for the rest.
pub fn short_for_prompt(tool: &dyn Tool) -> String {
    let base = tool.short_description().unwrap_or(tool.description());
    let first_sentence = base.split(['.', '\n']).next().unwrap_or(base).trim();
    let truncated: String = first_sentence.chars().take(MAX_SHORT_DESCRIPTION_CHARS).collect();
    format!("{truncated}. See introspection__get_tool_help for full docs.")
}

/// Run `name` against `tools` with `input`, auditing the call regardless of
/// outcome (spec §4.E: "All internal tools log to an audit sink... with
/// secrets redacted").
pub async fn dispatch(tools: &[Box<dyn Tool>], ctx: &dyn ToolContext, name: &str, input: serde_json::Value) -> ToolResult {
    let Some(tool) = tools.iter().find(|t| t.name() == name) else {
        return ToolResult::error(format!("no internal tool named '{name}'"));
    };
    let result = tool.execute(ctx, input.clone()).await;
    ctx.audit().record(make_record(name, &input, &result));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[test]
    fn build_tools_has_no_duplicate_names() {
        let tools = build_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len(), "duplicate tool name in catalog");
    }

    #[test]
    fn short_for_prompt_is_capped_and_points_at_help() {
        let tool = ReadFileTool;
        let short = short_for_prompt(&tool);
        assert!(short.len() <= MAX_SHORT_DESCRIPTION_CHARS + 80);
        assert!(short.contains("get_tool_help"));
    }

    #[tokio::test]
    async fn dispatch_runs_and_audits_a_known_tool() {
        let ctx = TestContext::unrestricted();
        let tools = build_tools();
        let result = dispatch(&tools, &ctx, "get_today_date", serde_json::json!({})).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn dispatch_errors_on_unknown_tool() {
        let ctx = TestContext::unrestricted();
        let tools = build_tools();
        let result = dispatch(&tools, &ctx, "does_not_exist", serde_json::json!({})).await;
        assert!(result.is_error);
    }
}
