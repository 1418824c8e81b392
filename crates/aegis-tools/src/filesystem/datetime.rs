//! Tools: `get_today_date`, `get_current_time` — grounding the model in the
//! real clock instead of its training cutoff (spec §4.E).

use async_trait::async_trait;
use chrono::Utc;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

pub struct GetTodayDateTool;

#[async_trait]
impl Tool for GetTodayDateTool {
    fn name(&self) -> &str {
        "get_today_date"
    }

    fn description(&self) -> &str {
        "Return today's date in UTC, ISO-8601 format (YYYY-MM-DD)."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Get today's date (UTC).")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _ctx: &dyn ToolContext, _input: serde_json::Value) -> ToolResult {
        ToolResult::success(Utc::now().format("%Y-%m-%d").to_string())
    }
}

pub struct GetCurrentTimeTool;

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Return the current time in UTC, ISO-8601 format (e.g. 2026-07-30T14:05:00Z)."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Get the current time (UTC).")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _ctx: &dyn ToolContext, _input: serde_json::Value) -> ToolResult {
        ToolResult::success(Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn returns_a_date_shaped_string() {
        let ctx = TestContext::unrestricted();
        let result = GetTodayDateTool.execute(&ctx, serde_json::json!({})).await;
        assert_eq!(result.content.len(), "YYYY-MM-DD".len());
    }

    #[tokio::test]
    async fn returns_an_rfc3339_timestamp() {
        let ctx = TestContext::unrestricted();
        let result = GetCurrentTimeTool.execute(&ctx, serde_json::json!({})).await;
        assert!(chrono::DateTime::parse_from_rfc3339(&result.content).is_ok());
    }
}
