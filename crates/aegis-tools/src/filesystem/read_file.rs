//! Tool: `read_file` — read a file, optionally a line range, capped at
//! 15 KB total (spec §4.E).

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

const MAX_OUTPUT_BYTES: usize = 15 * 1024;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Optionally restrict to a line range with \
         `line_start`/`line_end` (1-based, inclusive) or cap the number of lines \
         returned with `max_lines`. Output is capped at 15 KB total; longer results \
         are truncated with a notice."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Read the contents of a file.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file."},
                "line_start": {"type": "integer", "description": "1-based first line to include."},
                "line_end": {"type": "integer", "description": "1-based last line to include."},
                "max_lines": {"type": "integer", "description": "Cap on number of lines returned."}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("missing required parameter: path"),
        };
        let path = std::path::Path::new(path);

        if let Err(e) = ctx.path_policy().check(path) {
            return ToolResult::error(e);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to read '{}': {e}", path.display())),
        };

        let line_start = input.get("line_start").and_then(|v| v.as_u64()).map(|v| v.max(1) as usize - 1);
        let line_end = input.get("line_end").and_then(|v| v.as_u64()).map(|v| v as usize);
        let max_lines = input.get("max_lines").and_then(|v| v.as_u64()).map(|v| v as usize);

        let mut result = if line_start.is_some() || line_end.is_some() {
            let start = line_start.unwrap_or(0);
            let end = line_end.unwrap_or(usize::MAX);
            content
                .lines()
                .enumerate()
                .filter(|(i, _)| *i >= start && *i < end)
                .map(|(_, l)| l)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            content
        };

        if let Some(n) = max_lines {
            result = result.lines().take(n).collect::<Vec<_>>().join("\n");
        }

        if result.len() > MAX_OUTPUT_BYTES {
            let mut truncated: String = result.chars().take(MAX_OUTPUT_BYTES).collect();
            truncated.push_str(&format!("\n\n[truncated at {MAX_OUTPUT_BYTES} bytes]"));
            result = truncated;
        }

        ToolResult::success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn reads_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\ntwo\nthree").unwrap();
        let ctx = TestContext::unrestricted();
        let result = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": path.to_str().unwrap()}))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn reads_line_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\ntwo\nthree\nfour").unwrap();
        let ctx = TestContext::unrestricted();
        let result = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": path.to_str().unwrap(), "line_start": 2, "line_end": 3}))
            .await;
        assert_eq!(result.content, "two\nthree");
    }

    #[tokio::test]
    async fn denies_path_outside_policy() {
        let ctx = TestContext::restricted_to("/nonexistent-root-xyz");
        let result = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": "/etc/passwd"}))
            .await;
        assert!(result.is_error);
    }
}
