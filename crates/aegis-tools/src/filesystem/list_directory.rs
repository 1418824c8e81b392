//! Tool: `list_directory` — list a directory's entries (spec §4.E).

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

const MAX_ENTRIES: usize = 1_000;

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a directory. Each entry shows its type (file/dir) and \
         size in bytes. Returns at most 1000 entries."
    }

    fn short_description(&self) -> Option<&str> {
        Some("List directory contents.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string", "description": "Directory to list."}},
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

        let read_dir = match std::fs::read_dir(path) {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("failed to list '{}': {e}", path.display())),
        };

        let mut entries = Vec::new();
        let mut truncated = false;
        for entry in read_dir {
            if entries.len() >= MAX_ENTRIES {
                truncated = true;
                break;
            }
            let Ok(entry) = entry else { continue };
            let Ok(metadata) = entry.metadata() else { continue };
            let name = entry.file_name().to_string_lossy().to_string();
            let kind = if metadata.is_dir() { "dir" } else { "file" };
            entries.push(format!("[{kind}] {name} ({} bytes)", metadata.len()));
        }
        entries.sort();

        let mut out = entries.join("\n");
        if truncated {
            out.push_str(&format!("\n\n[truncated at {MAX_ENTRIES} entries]"));
        }
        ToolResult::success(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn lists_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = TestContext::unrestricted();
        let result = ListDirectoryTool
            .execute(&ctx, serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await;
        assert!(result.content.contains("[file] a.txt"));
        assert!(result.content.contains("[dir] sub"));
    }
}
