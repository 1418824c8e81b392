//! Introspection tools (spec §4.E): `search_knowledge_graph`,
//! `get_kg_entity`, `get_kg_stats`, `search_conversation_history`,
//! `inspect_mcp_prompt`, `execute_mcp_prompt`, `get_tool_help`.

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

pub struct SearchKnowledgeGraphTool;

#[async_trait]
impl Tool for SearchKnowledgeGraphTool {
    fn name(&self) -> &str {
        "search_knowledge_graph"
    }

    fn description(&self) -> &str {
        "Search every current-belief entity in the knowledge graph by substring, \
         regardless of entity type. Broader than 'search_knowledge', which is scoped to \
         curated knowledge entries."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Search all KG entities by substring.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "description": "Max results, default 10."}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::error("missing required parameter: query"),
        };
        let limit = input.get("limit").and_then(|v| v.as_i64()).unwrap_or(10);

        match ctx.knowledge_graph().search_knowledge(query, limit) {
            Ok(entities) if entities.is_empty() => ToolResult::success(format!("No entities found for: {query}")),
            Ok(entities) => {
                let rendered: Vec<String> = entities
                    .iter()
                    .map(|e| format!("{} ({}): {}", e.id, e.entity_type, e.data))
                    .collect();
                ToolResult::success(rendered.join("\n"))
            }
            Err(e) => ToolResult::error(format!("search_knowledge_graph failed: {e}")),
        }
    }
}

pub struct GetKgEntityTool;

#[async_trait]
impl Tool for GetKgEntityTool {
    fn name(&self) -> &str {
        "get_kg_entity"
    }

    fn description(&self) -> &str {
        "Fetch the current belief for a single (entity_type, entity_id) pair, raw JSON."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Fetch one KG entity by id.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"entity_type": {"type": "string"}, "entity_id": {"type": "string"}},
            "required": ["entity_type", "entity_id"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let entity_type = match input.get("entity_type").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("missing required parameter: entity_type"),
        };
        let entity_id = match input.get("entity_id").and_then(|v| v.as_str()) {
            Some(i) => i,
            None => return ToolResult::error("missing required parameter: entity_id"),
        };

        match ctx.knowledge_graph().get_current(entity_type, entity_id) {
            Ok(Some(entity)) => ToolResult::success(
                serde_json::to_string_pretty(&entity).unwrap_or_else(|_| "failed to render entity".to_string()),
            ),
            Ok(None) => ToolResult::error(format!("no current belief for {entity_type}:{entity_id}")),
            Err(e) => ToolResult::error(format!("get_kg_entity failed: {e}")),
        }
    }
}

pub struct GetKgStatsTool;

#[async_trait]
impl Tool for GetKgStatsTool {
    fn name(&self) -> &str {
        "get_kg_stats"
    }

    fn description(&self) -> &str {
        "Return rolled-up knowledge graph counts: total entities and relationships, \
         broken down by type."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Get knowledge graph counts.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &dyn ToolContext, _input: serde_json::Value) -> ToolResult {
        match ctx.knowledge_graph().stats() {
            Ok(stats) => ToolResult::success(
                serde_json::to_string_pretty(&stats).unwrap_or_else(|_| "failed to render stats".to_string()),
            ),
            Err(e) => ToolResult::error(format!("get_kg_stats failed: {e}")),
        }
    }
}

pub struct SearchConversationHistoryTool;

#[async_trait]
impl Tool for SearchConversationHistoryTool {
    fn name(&self) -> &str {
        "search_conversation_history"
    }

    fn description(&self) -> &str {
        "Search recent conversation transcript lines by substring, most recent match \
         last. Use this to recall something said earlier in this session."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Search this session's transcript.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "description": "Max matching lines, default 10."}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_lowercase(),
            _ => return ToolResult::error("missing required parameter: query"),
        };
        let limit = input.get("limit").and_then(|v| v.as_i64()).unwrap_or(10).max(1) as usize;

        let matches: Vec<String> = ctx
            .conversation_history()
            .into_iter()
            .filter(|line| line.to_lowercase().contains(&query))
            .collect();

        if matches.is_empty() {
            return ToolResult::success(format!("No conversation history matches for: {query}"));
        }
        let start = matches.len().saturating_sub(limit);
        ToolResult::success(matches[start..].join("\n"))
    }
}

pub struct InspectMcpPromptTool;

#[async_trait]
impl Tool for InspectMcpPromptTool {
    fn name(&self) -> &str {
        "inspect_mcp_prompt"
    }

    fn description(&self) -> &str {
        "Inspect a tool-server prompt's name, description, and arguments without \
         rendering or executing it."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Inspect a tool-server prompt's signature.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"server": {"type": "string"}, "name": {"type": "string"}},
            "required": ["server", "name"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let server = match input.get("server").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: server"),
        };
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };

        let supervisor = ctx.supervisor().lock().await;
        let Some(prompts) = supervisor.prompts(server) else {
            return ToolResult::error(format!("no tool-server named '{server}'"));
        };
        match prompts.iter().find(|p| p.name == name) {
            Some(prompt) => {
                let args: Vec<String> = prompt
                    .arguments
                    .iter()
                    .map(|a| format!("{} (required={})", a.name, a.required))
                    .collect();
                ToolResult::success(format!(
                    "{}: {}\narguments: {}",
                    prompt.name,
                    prompt.description,
                    if args.is_empty() { "(none)".to_string() } else { args.join(", ") }
                ))
            }
            None => ToolResult::error(format!("no prompt '{name}' on server '{server}'")),
        }
    }
}

pub struct ExecuteMcpPromptTool;

#[async_trait]
impl Tool for ExecuteMcpPromptTool {
    fn name(&self) -> &str {
        "execute_mcp_prompt"
    }

    fn description(&self) -> &str {
        "Render a tool-server prompt template with the given arguments and run the \
         resulting message list through a full agent turn, returning its final answer."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Render and run a tool-server prompt.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "server": {"type": "string"},
                "name": {"type": "string"},
                "arguments": {"type": "object"}
            },
            "required": ["server", "name"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let server = match input.get("server").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: server"),
        };
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };
        let arguments = input.get("arguments").cloned().unwrap_or(serde_json::json!({}));

        let messages = {
            let mut supervisor = ctx.supervisor().lock().await;
            match supervisor.get_prompt(server, name, arguments).await {
                Ok(m) => m,
                Err(e) => return ToolResult::error(format!("execute_mcp_prompt failed to render: {e}")),
            }
        };

        let Some(executor) = ctx.prompt_executor() else {
            return ToolResult::error("no prompt executor configured for this run");
        };

        match executor.run_messages(messages).await {
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(format!("execute_mcp_prompt failed: {e}")),
        }
    }
}

pub struct GetToolHelpTool;

#[async_trait]
impl Tool for GetToolHelpTool {
    fn name(&self) -> &str {
        "get_tool_help"
    }

    fn description(&self) -> &str {
        "Return the full, un-truncated description of any tool registered in the \
         current run, by name. Use this when a tool's short description in the tool \
         list isn't enough to know how to call it."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Get a tool's full description.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };

        let catalog = ctx.tool_catalog();
        match catalog.iter().find(|t| t.name == name) {
            Some(doc) => ToolResult::success(doc.description.clone()),
            None => {
                let available: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
                ToolResult::error(format!("no tool named '{name}'. Available: {}", available.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn search_knowledge_graph_finds_entities_of_any_type() {
        let ctx = TestContext::unrestricted();
        ctx.kg.insert_entity("job", "nightly", chrono::Utc::now(), None, serde_json::json!({"status": "ok"})).unwrap();
        let result = SearchKnowledgeGraphTool.execute(&ctx, serde_json::json!({"query": "ok"})).await;
        assert!(result.content.contains("nightly"));
    }

    #[tokio::test]
    async fn get_kg_entity_returns_not_found_error() {
        let ctx = TestContext::unrestricted();
        let result = GetKgEntityTool
            .execute(&ctx, serde_json::json!({"entity_type": "job", "entity_id": "missing"}))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn search_conversation_history_is_case_insensitive_and_limited() {
        let ctx = TestContext::unrestricted();
        // conversation_history() defaults to empty on TestContext, so this
        // just exercises the no-match path without overriding the trait.
        let result = SearchConversationHistoryTool.execute(&ctx, serde_json::json!({"query": "Deploy"})).await;
        assert!(result.content.starts_with("No conversation history matches"));
    }

    #[tokio::test]
    async fn execute_mcp_prompt_errors_without_executor() {
        let ctx = TestContext::unrestricted();
        let result = ExecuteMcpPromptTool
            .execute(&ctx, serde_json::json!({"server": "nope", "name": "x"}))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn get_tool_help_reports_unknown_tool() {
        let ctx = TestContext::unrestricted();
        let result = GetToolHelpTool.execute(&ctx, serde_json::json!({"name": "nonexistent"})).await;
        assert!(result.is_error);
    }
}
