//! KG query tools (spec §4.E): `recent_changes`, `late_discoveries`,
//! `discovery_lag_stats`, `entity_context`, `stats`. Thin wrappers over
//! `aegis_kg::KnowledgeGraph`'s already-built analytical queries, plus a
//! client-side aggregate (`discovery_lag_stats`) the graph itself doesn't
//! need to expose as a first-class method.

use async_trait::async_trait;
use chrono::Duration;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

fn render_entities(entities: &[aegis_kg::Entity]) -> String {
    entities
        .iter()
        .map(|e| {
            format!(
                "{} ({}) — valid_from={} tx_from={}",
                e.id,
                e.entity_type,
                e.valid_from.to_rfc3339(),
                e.tx_from.to_rfc3339()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct RecentChangesTool;

#[async_trait]
impl Tool for RecentChangesTool {
    fn name(&self) -> &str {
        "recent_changes"
    }

    fn description(&self) -> &str {
        "List current-belief knowledge graph entities recorded within the last N hours \
         (default 24), most recent first."
    }

    fn short_description(&self) -> Option<&str> {
        Some("List recently recorded KG entities.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "hours": {"type": "integer", "description": "Lookback window in hours, default 24."},
                "limit": {"type": "integer", "description": "Max results, default 20."}
            }
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let hours = input.get("hours").and_then(|v| v.as_i64()).unwrap_or(24);
        let limit = input.get("limit").and_then(|v| v.as_i64()).unwrap_or(20);
        match ctx.knowledge_graph().what_changed_recently(Duration::hours(hours), limit) {
            Ok(entities) if entities.is_empty() => ToolResult::success("No changes in that window."),
            Ok(entities) => ToolResult::success(render_entities(&entities)),
            Err(e) => ToolResult::error(format!("recent_changes failed: {e}")),
        }
    }
}

pub struct LateDiscoveriesTool;

#[async_trait]
impl Tool for LateDiscoveriesTool {
    fn name(&self) -> &str {
        "late_discoveries"
    }

    fn description(&self) -> &str {
        "List current-belief entities whose recording lagged the fact becoming true by \
         more than N hours (default 1), i.e. things learned 'late'."
    }

    fn short_description(&self) -> Option<&str> {
        Some("List entities learned about late.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "min_lag_hours": {"type": "integer", "description": "Minimum lag in hours, default 1."},
                "limit": {"type": "integer", "description": "Max results, default 20."}
            }
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let min_lag_hours = input.get("min_lag_hours").and_then(|v| v.as_i64()).unwrap_or(1);
        let limit = input.get("limit").and_then(|v| v.as_i64()).unwrap_or(20);
        match ctx.knowledge_graph().find_late_discoveries(Duration::hours(min_lag_hours), limit) {
            Ok(entities) if entities.is_empty() => ToolResult::success("No late discoveries found."),
            Ok(entities) => ToolResult::success(render_entities(&entities)),
            Err(e) => ToolResult::error(format!("late_discoveries failed: {e}")),
        }
    }
}

pub struct DiscoveryLagStatsTool;

#[async_trait]
impl Tool for DiscoveryLagStatsTool {
    fn name(&self) -> &str {
        "discovery_lag_stats"
    }

    fn description(&self) -> &str {
        "Summarize how far behind reality the knowledge graph's current beliefs tend to \
         be recorded: count, and min/avg/max lag in seconds between a fact becoming true \
         and the system recording it."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Summarize discovery lag across the KG.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &dyn ToolContext, _input: serde_json::Value) -> ToolResult {
        // Every current entity has non-negative lag by definition, so a
        // zero-duration floor captures the whole population.
        let entities = match ctx.knowledge_graph().find_late_discoveries(Duration::zero(), i64::MAX) {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("discovery_lag_stats failed: {e}")),
        };

        if entities.is_empty() {
            return ToolResult::success("No entities recorded yet.");
        }

        let lags_secs: Vec<i64> = entities.iter().map(|e| (e.tx_from - e.valid_from).num_seconds()).collect();
        let count = lags_secs.len() as i64;
        let sum: i64 = lags_secs.iter().sum();
        let avg = sum / count;
        let min = *lags_secs.iter().min().unwrap();
        let max = *lags_secs.iter().max().unwrap();

        ToolResult::success(format!(
            "count={count} min_lag_secs={min} avg_lag_secs={avg} max_lag_secs={max}"
        ))
    }
}

pub struct EntityContextTool;

#[async_trait]
impl Tool for EntityContextTool {
    fn name(&self) -> &str {
        "entity_context"
    }

    fn description(&self) -> &str {
        "Fetch an entity's current belief plus its directly related entities (one hop, \
         both directions) for context when reasoning about it."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Fetch an entity and its immediate relations.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entity_type": {"type": "string"},
                "entity_id": {"type": "string"}
            },
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

        let current = match ctx.knowledge_graph().get_current(entity_type, entity_id) {
            Ok(Some(e)) => e,
            Ok(None) => return ToolResult::error(format!("no current belief for {entity_type}:{entity_id}")),
            Err(e) => return ToolResult::error(format!("entity_context failed: {e}")),
        };

        let related = match ctx.knowledge_graph().get_related(entity_id, None, aegis_kg::Direction::Both) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("entity_context failed: {e}")),
        };

        let mut out = format!("# {} ({})\n{}\n", current.id, current.entity_type, current.data);
        if related.is_empty() {
            out.push_str("\nNo related entities.");
        } else {
            out.push_str("\n## Related\n");
            for rel in &related {
                out.push_str(&format!("- {} --[{}]--> {}\n", rel.source_id, rel.rel_type, rel.target_id));
            }
        }
        ToolResult::success(out)
    }
}

pub struct KgStatsTool;

#[async_trait]
impl Tool for KgStatsTool {
    fn name(&self) -> &str {
        "stats"
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
            Err(e) => ToolResult::error(format!("stats failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn recent_changes_reports_fresh_inserts() {
        let ctx = TestContext::unrestricted();
        ctx.kg.insert_entity("job", "nightly", chrono::Utc::now(), None, serde_json::json!({"status": "ok"})).unwrap();
        let result = RecentChangesTool.execute(&ctx, serde_json::json!({"hours": 1})).await;
        assert!(result.content.contains("nightly"));
    }

    #[tokio::test]
    async fn late_discoveries_surfaces_backdated_facts() {
        let ctx = TestContext::unrestricted();
        let old = chrono::Utc::now() - chrono::Duration::days(5);
        ctx.kg.insert_entity("fact", "old-one", old, None, serde_json::json!({})).unwrap();
        let result = LateDiscoveriesTool.execute(&ctx, serde_json::json!({"min_lag_hours": 1})).await;
        assert!(result.content.contains("old-one"));
    }

    #[tokio::test]
    async fn discovery_lag_stats_reports_counts() {
        let ctx = TestContext::unrestricted();
        ctx.kg.insert_entity("fact", "a", chrono::Utc::now(), None, serde_json::json!({})).unwrap();
        let result = DiscoveryLagStatsTool.execute(&ctx, serde_json::json!({})).await;
        assert!(result.content.starts_with("count=1"));
    }

    #[tokio::test]
    async fn entity_context_includes_relationships() {
        let ctx = TestContext::unrestricted();
        let t = chrono::Utc::now();
        ctx.kg.insert_entity("person", "alice", t, None, serde_json::json!({"name": "Alice"})).unwrap();
        ctx.kg.insert_entity("person", "bob", t, None, serde_json::json!({"name": "Bob"})).unwrap();
        ctx.kg.insert_relationship("manages", "alice", "bob", t, None, serde_json::json!({})).unwrap();

        let result = EntityContextTool
            .execute(&ctx, serde_json::json!({"entity_type": "person", "entity_id": "alice"}))
            .await;
        assert!(result.content.contains("Related"));
        assert!(result.content.contains("bob"));
    }

    #[tokio::test]
    async fn stats_reflects_inserted_counts() {
        let ctx = TestContext::unrestricted();
        ctx.kg.insert_entity("job", "a", chrono::Utc::now(), None, serde_json::json!({})).unwrap();
        let result = KgStatsTool.execute(&ctx, serde_json::json!({})).await;
        assert!(result.content.contains("\"total_entities\": 1"));
    }
}
