//! Report tools (spec §4.E): write/append/read/list/delete artifacts in
//! four formats — markdown, JSON-lines, CSV, TSV. A single `report` tool
//! dispatches on `action`/`format`, mirroring the teacher's single-tool
//! multi-action `reminder` tool shape.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

const MAX_READ_BYTES: usize = 20 * 1024;

fn extension_for(format: &str) -> Option<&'static str> {
    match format {
        "markdown" => Some("md"),
        "jsonl" => Some("jsonl"),
        "csv" => Some("csv"),
        "tsv" => Some("tsv"),
        _ => None,
    }
}

/// Resolve `name` + `format` to a path under `reports_dir`, rejecting any
/// path component that would escape it.
fn resolve_path(reports_dir: &std::path::Path, name: &str, format: &str) -> Result<std::path::PathBuf, String> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(format!("invalid report name '{name}'"));
    }
    let ext = extension_for(format).ok_or_else(|| format!("unknown format '{format}': use markdown, jsonl, csv, or tsv"))?;
    Ok(reports_dir.join(format!("{name}.{ext}")))
}

fn validate_jsonl(content: &str) -> Result<(), String> {
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = serde_json::from_str::<Value>(line) {
            return Err(format!("jsonl line {} does not parse as JSON: {e}", idx + 1));
        }
    }
    Ok(())
}

fn markdown_header(name: &str) -> String {
    format!("# Report: {name}\n_generated {}_\n\n", Utc::now().to_rfc3339())
}

pub struct ReportTool;

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        "report"
    }

    fn description(&self) -> &str {
        "Write, append to, read, list, or delete report artifacts in markdown, jsonl, \
         csv, or tsv format. Actions: 'write' (overwrite, creating a markdown header \
         once for new markdown files), 'append', 'read', 'list' (names of all artifacts \
         in a format), 'delete'. jsonl content is validated line-by-line as JSON."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Write/read/list/delete report artifacts.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["write", "append", "read", "list", "delete"]},
                "format": {"type": "string", "enum": ["markdown", "jsonl", "csv", "tsv"]},
                "name": {"type": "string", "description": "Artifact name, without extension."},
                "content": {"type": "string", "description": "Content to write/append. Required for write/append."}
            },
            "required": ["action", "format"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };
        let format = match input.get("format").and_then(|v| v.as_str()) {
            Some(f) => f,
            None => return ToolResult::error("missing required parameter: format"),
        };

        if action == "list" {
            return list_artifacts(ctx.reports_dir(), format);
        }

        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };
        let path = match resolve_path(ctx.reports_dir(), name, format) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        match action {
            "write" => write_artifact(&path, name, format, &input, false),
            "append" => write_artifact(&path, name, format, &input, true),
            "read" => read_artifact(&path),
            "delete" => delete_artifact(&path, name),
            other => ToolResult::error(format!("unknown action '{other}'")),
        }
    }
}

fn write_artifact(path: &std::path::Path, name: &str, format: &str, input: &Value, append: bool) -> ToolResult {
    let content = match input.get("content").and_then(|v| v.as_str()) {
        Some(c) => c,
        None => return ToolResult::error("missing required parameter: content"),
    };

    if format == "jsonl" {
        if let Err(e) = validate_jsonl(content) {
            return ToolResult::error(e);
        }
    }

    let is_new = !path.exists();

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return ToolResult::error(format!("failed to create reports dir: {e}"));
        }
    }

    let mut body = String::new();
    if format == "markdown" && is_new && !append {
        body.push_str(&markdown_header(name));
    }
    body.push_str(content);
    if !body.ends_with('\n') {
        body.push('\n');
    }

    let result = if append {
        use std::io::Write;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(body.as_bytes()))
    } else {
        std::fs::write(path, body)
    };

    match result {
        Ok(()) => ToolResult::success(format!("Report '{name}' ({format}) {}.", if append { "appended" } else { "written" })),
        Err(e) => ToolResult::error(format!("failed to write report '{name}': {e}")),
    }
}

fn read_artifact(path: &std::path::Path) -> ToolResult {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            if content.len() > MAX_READ_BYTES {
                let mut truncated: String = content.chars().take(MAX_READ_BYTES).collect();
                truncated.push_str(&format!("\n\n[truncated at {MAX_READ_BYTES} bytes]"));
                ToolResult::success(truncated)
            } else {
                ToolResult::success(content)
            }
        }
        Err(e) => ToolResult::error(format!("failed to read '{}': {e}", path.display())),
    }
}

fn delete_artifact(path: &std::path::Path, name: &str) -> ToolResult {
    match std::fs::remove_file(path) {
        Ok(()) => ToolResult::success(format!("Report '{name}' deleted.")),
        Err(e) => ToolResult::error(format!("failed to delete '{name}': {e}")),
    }
}

fn list_artifacts(reports_dir: &std::path::Path, format: &str) -> ToolResult {
    let Some(ext) = extension_for(format) else {
        return ToolResult::error(format!("unknown format '{format}'"));
    };
    let entries = match std::fs::read_dir(reports_dir) {
        Ok(e) => e,
        Err(_) => return ToolResult::success("(no reports directory yet)"),
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|x| x.to_str()) == Some(ext) {
                path.file_stem().map(|s| s.to_string_lossy().to_string())
            } else {
                None
            }
        })
        .collect();
    names.sort();
    if names.is_empty() {
        ToolResult::success(format!("No {format} reports found."))
    } else {
        ToolResult::success(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn markdown_write_prepends_header_once() {
        let ctx = TestContext::unrestricted();
        ReportTool
            .execute(&ctx, serde_json::json!({"action": "write", "format": "markdown", "name": "daily", "content": "first"}))
            .await;
        let path = ctx.reports_dir.join("daily.md");
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.starts_with("# Report: daily"));

        ReportTool
            .execute(&ctx, serde_json::json!({"action": "append", "format": "markdown", "name": "daily", "content": "second"}))
            .await;
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(second.matches("# Report: daily").count(), 1);
        assert!(second.contains("second"));
    }

    #[tokio::test]
    async fn jsonl_write_rejects_invalid_json_line() {
        let ctx = TestContext::unrestricted();
        let result = ReportTool
            .execute(&ctx, serde_json::json!({"action": "write", "format": "jsonl", "name": "events", "content": "{\"a\":1}\nnot json"}))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn list_and_delete_roundtrip() {
        let ctx = TestContext::unrestricted();
        ReportTool
            .execute(&ctx, serde_json::json!({"action": "write", "format": "csv", "name": "nums", "content": "1,2,3"}))
            .await;
        let listed = ReportTool.execute(&ctx, serde_json::json!({"action": "list", "format": "csv"})).await;
        assert_eq!(listed.content, "nums");

        let deleted = ReportTool.execute(&ctx, serde_json::json!({"action": "delete", "format": "csv", "name": "nums"})).await;
        assert!(!deleted.is_error);
        assert!(!ctx.reports_dir.join("nums.csv").exists());
    }

    #[test]
    fn resolve_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_path(dir.path(), "../escape", "markdown").is_err());
        assert!(resolve_path(dir.path(), "ok", "markdown").is_ok());
    }
}
