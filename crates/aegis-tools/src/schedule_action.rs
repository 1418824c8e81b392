//! Schedule action tools (spec §4.E): enqueue one-shot future actions,
//! distinct from the recurring monitors/tasks CRUD in `schedule_tools`.
//! Backed by `aegis_scheduler`'s `oneshot` table via `SchedulerHandle`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

fn resolve_fire_at(input: &serde_json::Value) -> Result<DateTime<Utc>, String> {
    if let Some(fire_at) = input.get("fire_at").and_then(|v| v.as_str()) {
        return DateTime::parse_from_rfc3339(fire_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid fire_at datetime: {e}"));
    }
    if let Some(secs) = input.get("fire_in_seconds").and_then(|v| v.as_i64()) {
        if secs <= 0 {
            return Err("fire_in_seconds must be a positive integer".to_string());
        }
        return Ok(Utc::now() + Duration::seconds(secs));
    }
    Err("one of 'fire_at' or 'fire_in_seconds' is required".to_string())
}

pub struct ScheduleActionTool;

#[async_trait]
impl Tool for ScheduleActionTool {
    fn name(&self) -> &str {
        "schedule_action"
    }

    fn description(&self) -> &str {
        "Enqueue, list, or cancel one-shot future actions — a single body of text to \
         re-inject at a future time, distinct from recurring monitors/tasks. Actions: \
         'enqueue' (body, plus one of fire_at [RFC3339] or fire_in_seconds), 'list' \
         (pending actions), 'cancel' (id)."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Enqueue/list/cancel one-shot future actions.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["enqueue", "list", "cancel"]},
                "body": {"type": "string"},
                "fire_at": {"type": "string", "description": "RFC3339 timestamp."},
                "fire_in_seconds": {"type": "integer"},
                "id": {"type": "string"}
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };

        match action {
            "enqueue" => {
                let body = match input.get("body").and_then(|v| v.as_str()) {
                    Some(b) if !b.trim().is_empty() => b.trim(),
                    _ => return ToolResult::error("missing required parameter: body"),
                };
                let fire_at = match resolve_fire_at(&input) {
                    Ok(t) => t,
                    Err(e) => return ToolResult::error(e),
                };
                match ctx.scheduler().enqueue_oneshot(body, fire_at) {
                    Ok(action) => ToolResult::success(format!(
                        "Enqueued action {} to fire at {}.",
                        action.id,
                        action.fire_at.to_rfc3339()
                    )),
                    Err(e) => ToolResult::error(format!("schedule_action enqueue failed: {e}")),
                }
            }
            "list" => match ctx.scheduler().list_pending_oneshots() {
                Ok(actions) if actions.is_empty() => ToolResult::success("No pending one-shot actions."),
                Ok(actions) => {
                    let lines: Vec<String> = actions
                        .iter()
                        .map(|a| format!("{} — fires at {} — {}", a.id, a.fire_at.to_rfc3339(), a.body))
                        .collect();
                    ToolResult::success(lines.join("\n"))
                }
                Err(e) => ToolResult::error(format!("schedule_action list failed: {e}")),
            },
            "cancel" => {
                let id = match input.get("id").and_then(|v| v.as_str()) {
                    Some(i) => i,
                    None => return ToolResult::error("missing required parameter: id"),
                };
                match ctx.scheduler().cancel_oneshot(id) {
                    Ok(true) => ToolResult::success(format!("Cancelled action {id}.")),
                    Ok(false) => ToolResult::error(format!("no pending action with id '{id}'")),
                    Err(e) => ToolResult::error(format!("schedule_action cancel failed: {e}")),
                }
            }
            other => ToolResult::error(format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn enqueue_list_and_cancel_roundtrip() {
        let ctx = TestContext::unrestricted();
        let enqueued = ScheduleActionTool
            .execute(&ctx, serde_json::json!({"action": "enqueue", "body": "ping the server", "fire_in_seconds": 60}))
            .await;
        assert!(!enqueued.is_error, "{}", enqueued.content);

        let listed = ScheduleActionTool.execute(&ctx, serde_json::json!({"action": "list"})).await;
        assert!(listed.content.contains("ping the server"));

        let id = listed.content.split(" — ").next().unwrap().to_string();
        let cancelled = ScheduleActionTool.execute(&ctx, serde_json::json!({"action": "cancel", "id": id})).await;
        assert!(!cancelled.is_error);

        let listed_after = ScheduleActionTool.execute(&ctx, serde_json::json!({"action": "list"})).await;
        assert_eq!(listed_after.content, "No pending one-shot actions.");
    }

    #[tokio::test]
    async fn enqueue_rejects_missing_fire_time() {
        let ctx = TestContext::unrestricted();
        let result = ScheduleActionTool.execute(&ctx, serde_json::json!({"action": "enqueue", "body": "x"})).await;
        assert!(result.is_error);
    }
}
