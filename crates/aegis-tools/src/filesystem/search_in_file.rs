//! Tool: `search_in_file` — regex search within a single file, numbered
//! matches capped at `max_results` (spec §4.E).

use async_trait::async_trait;
use regex::Regex;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

const DEFAULT_MAX_RESULTS: usize = 50;

pub struct SearchInFileTool;

#[async_trait]
impl Tool for SearchInFileTool {
    fn name(&self) -> &str {
        "search_in_file"
    }

    fn description(&self) -> &str {
        "Search a single file for lines matching a regular expression. Returns numbered \
         matches in `line_number: content` format, capped at `max_results` (default 50)."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Regex-search a single file.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File to search."},
                "pattern": {"type": "string", "description": "Regular expression to match against each line."},
                "max_results": {"type": "integer", "description": "Maximum number of matches to return (default 50)."}
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let path = match input.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("missing required parameter: path"),
        };
        let pattern = match input.get("pattern").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p,
            _ => return ToolResult::error("missing required parameter: pattern"),
        };
        let max_results = input.get("max_results").and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(DEFAULT_MAX_RESULTS);

        let path = std::path::Path::new(path);
        if let Err(e) = ctx.path_policy().check(path) {
            return ToolResult::error(e);
        }

        let re = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("invalid regex '{pattern}': {e}")),
        };

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to read '{}': {e}", path.display())),
        };

        let mut matches = Vec::new();
        let mut truncated = false;
        for (idx, line) in content.lines().enumerate() {
            if matches.len() >= max_results {
                truncated = true;
                break;
            }
            if re.is_match(line) {
                matches.push(format!("{}: {}", idx + 1, line));
            }
        }

        if matches.is_empty() {
            return ToolResult::success("No matches found.");
        }

        let mut out = matches.join("\n");
        if truncated {
            out.push_str(&format!("\n\n[truncated at {max_results} matches]"));
        }
        ToolResult::success(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "ok\nERROR foo\nok\nERROR bar").unwrap();
        let ctx = TestContext::unrestricted();
        let result = SearchInFileTool
            .execute(&ctx, serde_json::json!({"path": path.to_str().unwrap(), "pattern": "^ERROR"}))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "2: ERROR foo\n4: ERROR bar");
    }

    #[tokio::test]
    async fn rejects_invalid_regex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "x").unwrap();
        let ctx = TestContext::unrestricted();
        let result = SearchInFileTool
            .execute(&ctx, serde_json::json!({"path": path.to_str().unwrap(), "pattern": "("}))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn caps_at_max_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "a\n".repeat(10)).unwrap();
        let ctx = TestContext::unrestricted();
        let result = SearchInFileTool
            .execute(&ctx, serde_json::json!({"path": path.to_str().unwrap(), "pattern": "a", "max_results": 3}))
            .await;
        assert!(result.content.contains("[truncated at 3 matches]"));
    }
}
