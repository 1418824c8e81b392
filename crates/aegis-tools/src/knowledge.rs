//! Knowledge tools (spec §4.E): `save_knowledge`, `search_knowledge`,
//! `trigger_synthesis`. Generalizes the teacher's single FTS5
//! `knowledge_search`/`knowledge_write` pair from one flat table into
//! entries backed by the bi-temporal knowledge graph, typed and
//! tag/confidence-scored per spec §4.B.

use async_trait::async_trait;
use chrono::Utc;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

/// Knowledge entities use deterministic IDs of the form `<type>:<key>`
/// (spec §3) so `save_knowledge` is idempotent by key.
fn entity_id(entity_type: &str, key: &str) -> String {
    format!("{entity_type}:{key}")
}

fn render_entity(entity: &aegis_kg::Entity) -> String {
    let content = entity.data.get("content").and_then(|v| v.as_str()).unwrap_or("");
    let tags = entity
        .data
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|t| t.as_str()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    let confidence = entity.data.get("confidence").and_then(|v| v.as_f64());

    let mut out = format!("### {} ({})\n", entity.id, entity.entity_type);
    if !tags.is_empty() {
        out.push_str(&format!("tags: {tags}\n"));
    }
    if let Some(c) = confidence {
        out.push_str(&format!("confidence: {c}\n"));
    }
    out.push_str(content);
    out
}

pub struct SaveKnowledgeTool;

#[async_trait]
impl Tool for SaveKnowledgeTool {
    fn name(&self) -> &str {
        "save_knowledge"
    }

    fn description(&self) -> &str {
        "Save or update a fact in the knowledge graph, keyed by (type, key). Saving \
         again with the same type and key supersedes the previous belief rather than \
         duplicating it. Use types like 'user_preference', 'lesson_learned', \
         'project_context', or 'decision_rationale'."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Save a fact to the knowledge graph.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "description": "Entity type, e.g. 'user_preference'."},
                "key": {"type": "string", "description": "Unique key within this type."},
                "content": {"type": "string", "description": "The fact, as markdown or plain text."},
                "tags": {"type": "array", "items": {"type": "string"}},
                "confidence": {"type": "number", "description": "0.0-1.0, defaults to 1.0."}
            },
            "required": ["type", "key", "content"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let entity_type = match input.get("type").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => return ToolResult::error("missing required parameter: type"),
        };
        let key = match input.get("key").and_then(|v| v.as_str()) {
            Some(k) if !k.trim().is_empty() => k.trim(),
            _ => return ToolResult::error("missing required parameter: key"),
        };
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c.trim(),
            _ => return ToolResult::error("missing required parameter: content"),
        };
        let tags: Vec<String> = input
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let confidence = input.get("confidence").and_then(|v| v.as_f64()).unwrap_or(1.0);

        let id = entity_id(entity_type, key);
        let now = Utc::now();
        let data = serde_json::json!({"content": content, "tags": tags, "confidence": confidence});

        match ctx.knowledge_graph().insert_entity(entity_type, &id, now, None, data) {
            Ok(_) => ToolResult::success(format!("Saved knowledge '{id}'.")),
            Err(e) => ToolResult::error(format!("save_knowledge failed: {e}")),
        }
    }
}

pub struct SearchKnowledgeTool;

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search knowledge graph entities by type, free-text query, and/or tags. \
         Returns matching current-belief entries, most recently recorded first."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Search the knowledge graph.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "description": "Restrict to this entity type."},
                "query": {"type": "string", "description": "Free-text query over saved content."},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Require at least one of these tags."},
                "limit": {"type": "integer", "description": "Max results, default 10."}
            }
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let type_filter = input.get("type").and_then(|v| v.as_str());
        let query = input.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let tag_filter: Vec<&str> = input
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str()).collect())
            .unwrap_or_default();
        let limit = input.get("limit").and_then(|v| v.as_i64()).unwrap_or(10).max(1);

        // Over-fetch from the substring index, then apply type/tag filters
        // client-side — the graph's search only indexes the raw data blob.
        let candidates = match ctx.knowledge_graph().search_knowledge(query, limit * 10) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("search_knowledge failed: {e}")),
        };

        let matches: Vec<&aegis_kg::Entity> = candidates
            .iter()
            .filter(|e| type_filter.map(|t| e.entity_type == t).unwrap_or(true))
            .filter(|e| {
                if tag_filter.is_empty() {
                    return true;
                }
                let entity_tags: Vec<&str> = e
                    .data
                    .get("tags")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|t| t.as_str()).collect())
                    .unwrap_or_default();
                tag_filter.iter().any(|t| entity_tags.contains(t))
            })
            .take(limit as usize)
            .collect();

        if matches.is_empty() {
            return ToolResult::success("No matching knowledge entries found.");
        }

        let rendered: Vec<String> = matches.iter().map(|e| render_entity(e)).collect();
        ToolResult::success(rendered.join("\n\n---\n\n"))
    }
}

pub struct TriggerSynthesisTool;

#[async_trait]
impl Tool for TriggerSynthesisTool {
    fn name(&self) -> &str {
        "trigger_synthesis"
    }

    fn description(&self) -> &str {
        "Request that the knowledge graph be synthesized (consolidated, deduplicated, \
         re-scored) on the next opportunity. This only sets a pending flag; synthesis \
         itself runs out-of-band."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Request knowledge graph synthesis.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"focus": {"type": "string", "description": "Optional hint for what to prioritize."}}
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let focus = input.get("focus").and_then(|v| v.as_str()).map(String::from);
        ctx.mark_synthesis_pending(focus.clone());
        match focus {
            Some(f) => ToolResult::success(format!("Synthesis requested (focus: {f}).")),
            None => ToolResult::success("Synthesis requested."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn save_then_search_roundtrips() {
        let ctx = TestContext::unrestricted();
        let saved = SaveKnowledgeTool
            .execute(
                &ctx,
                serde_json::json!({"type": "user_preference", "key": "editor", "content": "prefers vim", "tags": ["editor"]}),
            )
            .await;
        assert!(!saved.is_error);

        let found = SearchKnowledgeTool
            .execute(&ctx, serde_json::json!({"type": "user_preference", "query": "vim"}))
            .await;
        assert!(found.content.contains("prefers vim"));
    }

    #[tokio::test]
    async fn save_is_idempotent_by_key() {
        let ctx = TestContext::unrestricted();
        SaveKnowledgeTool
            .execute(&ctx, serde_json::json!({"type": "job", "key": "nightly", "content": "v1"}))
            .await;
        SaveKnowledgeTool
            .execute(&ctx, serde_json::json!({"type": "job", "key": "nightly", "content": "v2"}))
            .await;

        let current = ctx.kg.get_current("job", "job:nightly").unwrap().unwrap();
        assert_eq!(current.data["content"], "v2");
    }

    #[tokio::test]
    async fn search_filters_by_tag() {
        let ctx = TestContext::unrestricted();
        SaveKnowledgeTool
            .execute(&ctx, serde_json::json!({"type": "fact", "key": "a", "content": "alpha", "tags": ["x"]}))
            .await;
        SaveKnowledgeTool
            .execute(&ctx, serde_json::json!({"type": "fact", "key": "b", "content": "beta", "tags": ["y"]}))
            .await;

        let found = SearchKnowledgeTool
            .execute(&ctx, serde_json::json!({"tags": ["x"]}))
            .await;
        assert!(found.content.contains("alpha"));
        assert!(!found.content.contains("beta"));
    }

    #[tokio::test]
    async fn trigger_synthesis_sets_pending_flag() {
        let ctx = TestContext::unrestricted();
        let result = TriggerSynthesisTool
            .execute(&ctx, serde_json::json!({"focus": "stale jobs"}))
            .await;
        assert!(!result.is_error);
        assert_eq!(*ctx.synthesis_pending.lock().unwrap(), Some(Some("stale jobs".to_string())));
    }
}
