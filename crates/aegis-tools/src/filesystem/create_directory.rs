//! Tool: `create_directory` — create a directory (and parents). Named by
//! spec §4.E as the example *confirm-tools* member: if listed in the
//! command policy's confirm-tools, a user-confirmation callback must
//! approve before it acts.

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory, including any missing parent directories. May require \
         user confirmation depending on the operator's confirm-tools configuration."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Create a directory.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "Directory path to create."}},
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("missing required parameter: path"),
        };
        let path_ref = std::path::Path::new(path);
        if let Err(e) = ctx.path_policy().check(path_ref) {
            return ToolResult::error(e);
        }

        if ctx.command_policy().requires_confirmation(self.name()) && !ctx.confirm(self.name(), path).await {
            return ToolResult::error(format!("user declined to confirm creating directory '{path}'"));
        }

        match std::fs::create_dir_all(path_ref) {
            Ok(()) => ToolResult::success(format!("Directory created: {path}")),
            Err(e) => ToolResult::error(format!("failed to create '{path}': {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        let ctx = TestContext::unrestricted();
        let result = CreateDirectoryTool
            .execute(&ctx, serde_json::json!({"path": target.to_str().unwrap()}))
            .await;
        assert!(!result.is_error);
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn denies_when_confirmation_declined() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x");
        let mut ctx = TestContext::with_command_policy(vec![], vec!["create_directory"]);
        ctx.confirm_result = false;
        let result = CreateDirectoryTool
            .execute(&ctx, serde_json::json!({"path": target.to_str().unwrap()}))
            .await;
        assert!(result.is_error);
        assert!(!target.exists());
    }
}
