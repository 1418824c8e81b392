//! Tool: `execute_command` — one-shot shell command via `aegis-terminal`,
//! gated by the allowed-commands policy (spec §4.E).

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout and stderr. Only commands whose \
         basename is on the operator's allow-list may run; others are rejected outright, \
         or require interactive confirmation if a confirmation callback is configured. \
         Non-interactive runs time out after 30s by default (300s max); interactive runs \
         have no timeout."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Execute a shell command.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run via sh -c."},
                "timeout_secs": {"type": "integer", "description": "Override the default 30s timeout, capped at 300s (non-interactive mode only)."}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::error("missing required parameter: command"),
        };

        let allowed = ctx.command_policy().is_command_allowed(command);
        if !allowed {
            if ctx.has_confirm_callback() {
                if !ctx.confirm(self.name(), command).await {
                    return ToolResult::error(format!("user declined to confirm running '{command}'"));
                }
            } else {
                return ToolResult::error(format!(
                    "command '{command}' is not on the allowed-commands list"
                ));
            }
        }

        let timeout_secs = if ctx.has_confirm_callback() {
            None
        } else {
            Some(
                input
                    .get("timeout_secs")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(30)
                    .min(300),
            )
        };

        let options = aegis_terminal::ExecOptions {
            timeout_secs,
            max_output_chars: 20_000,
            skip_safety: false,
        };

        match ctx.terminal().exec(command, options).await {
            Ok(result) => {
                let mut output = String::new();
                if !result.stdout.is_empty() {
                    output.push_str(&result.stdout);
                }
                if !result.stderr.is_empty() {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str("[stderr]\n");
                    output.push_str(&result.stderr);
                }
                if result.exit_code != 0 {
                    output.push_str(&format!("\n[exit code: {}]", result.exit_code));
                }
                if output.is_empty() {
                    output = "(no output)".to_string();
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn rejects_command_not_on_allowlist() {
        let ctx = TestContext::unrestricted();
        let result = ExecuteCommandTool.execute(&ctx, serde_json::json!({"command": "echo hi"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn runs_allowed_command() {
        let ctx = TestContext::with_command_policy(vec!["echo"], vec![]);
        let result = ExecuteCommandTool.execute(&ctx, serde_json::json!({"command": "echo hi"})).await;
        assert!(!result.is_error);
        assert!(result.content.contains("hi"));
    }

    #[tokio::test]
    async fn prompts_confirmation_for_disallowed_command_in_interactive_mode() {
        let mut ctx = TestContext::unrestricted();
        ctx.has_confirm_callback = true;
        ctx.confirm_result = true;
        let result = ExecuteCommandTool.execute(&ctx, serde_json::json!({"command": "echo hi"})).await;
        assert!(!result.is_error);
    }
}
