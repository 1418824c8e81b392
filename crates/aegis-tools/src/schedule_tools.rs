//! Schedule tools (spec §4.E): CRUD over the persisted schedule file
//! (monitors and tasks). A single `schedule` tool dispatches on `action`,
//! mirroring the teacher's single-tool `reminder` shape. Edits go through
//! `aegis_scheduler::ScheduleFile`, validating `interval` via
//! `parse_interval` before it is written to disk.

use async_trait::async_trait;
use aegis_scheduler::{parse_interval, ScheduleFile, ScheduleFileEntry};

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

fn load(path: &std::path::Path) -> Result<ScheduleFile, String> {
    if path.exists() {
        ScheduleFile::load(path).map_err(|e| e.to_string())
    } else {
        Ok(ScheduleFile::default())
    }
}

fn render_entry(kind: &str, entry: &ScheduleFileEntry) -> String {
    format!(
        "[{kind}] {} — interval: {} — enabled: {}{}",
        entry.name,
        entry.interval,
        entry.enabled,
        entry.description.as_ref().map(|d| format!(" — {d}")).unwrap_or_default()
    )
}

pub struct ScheduleTool;

#[async_trait]
impl Tool for ScheduleTool {
    fn name(&self) -> &str {
        "schedule"
    }

    fn description(&self) -> &str {
        "Create, list, update, or remove scheduled monitors and tasks. Actions: 'list', \
         'add' (requires kind: monitor|task, name, prompt, interval), 'set_enabled' \
         (name, enabled), 'remove' (name). `interval` accepts duration strings (30s, 5m, \
         1h), time-of-day (9:00 on weekdays), or interval-within-range \
         (1h between 9:00 and 23:00 on weekdays)."
    }

    fn short_description(&self) -> Option<&str> {
        Some("CRUD over scheduled monitors/tasks.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "add", "set_enabled", "remove"]},
                "kind": {"type": "string", "enum": ["monitor", "task"]},
                "name": {"type": "string"},
                "prompt": {"type": "string"},
                "interval": {"type": "string"},
                "description": {"type": "string"},
                "enabled": {"type": "boolean"},
                "conditions": {"type": "string"},
                "notify": {"type": "boolean"},
                "notification_channels": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required parameter: action"),
        };

        let mut file = match load(ctx.schedule_file_path()) {
            Ok(f) => f,
            Err(e) => return ToolResult::error(format!("failed to load schedule file: {e}")),
        };

        match action {
            "list" => {
                let mut lines: Vec<String> = file.monitors.iter().map(|e| render_entry("monitor", e)).collect();
                lines.extend(file.tasks.iter().map(|e| render_entry("task", e)));
                if lines.is_empty() {
                    ToolResult::success("No scheduled monitors or tasks.")
                } else {
                    ToolResult::success(lines.join("\n"))
                }
            }
            "add" => self.add(ctx, &mut file, &input).await,
            "set_enabled" => self.set_enabled(ctx, &mut file, &input).await,
            "remove" => self.remove(ctx, &mut file, &input).await,
            other => ToolResult::error(format!("unknown action '{other}'")),
        }
    }
}

impl ScheduleTool {
    async fn add(&self, ctx: &dyn ToolContext, file: &mut ScheduleFile, input: &serde_json::Value) -> ToolResult {
        let kind = input.get("kind").and_then(|v| v.as_str()).unwrap_or("task");
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => return ToolResult::error("missing required parameter: name"),
        };
        let prompt = match input.get("prompt").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => return ToolResult::error("missing required parameter: prompt"),
        };
        let interval = match input.get("interval").and_then(|v| v.as_str()) {
            Some(i) => i.to_string(),
            None => return ToolResult::error("missing required parameter: interval"),
        };
        if let Err(e) = parse_interval(&interval) {
            return ToolResult::error(format!("invalid interval '{interval}': {e}"));
        }

        if file.all_entries().any(|e| e.name == name) {
            return ToolResult::error(format!("an entry named '{name}' already exists"));
        }

        let entry = ScheduleFileEntry {
            name: name.clone(),
            prompt,
            interval,
            description: input.get("description").and_then(|v| v.as_str()).map(String::from),
            enabled: input.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
            conditions: input.get("conditions").and_then(|v| v.as_str()).map(String::from),
            prompt_arguments: input.get("prompt_arguments").cloned(),
            notify: input.get("notify").and_then(|v| v.as_bool()),
            notification_channels: input
                .get("notification_channels")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|c| c.as_str().map(String::from)).collect()),
        };

        match kind {
            "monitor" => file.monitors.push(entry),
            _ => file.tasks.push(entry),
        }

        match file.save(ctx.schedule_file_path()) {
            Ok(()) => ToolResult::success(format!("Added {kind} '{name}'.")),
            Err(e) => ToolResult::error(format!("failed to save schedule file: {e}")),
        }
    }

    async fn set_enabled(&self, ctx: &dyn ToolContext, file: &mut ScheduleFile, input: &serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };
        let enabled = match input.get("enabled").and_then(|v| v.as_bool()) {
            Some(e) => e,
            None => return ToolResult::error("missing required parameter: enabled"),
        };

        let mut found = false;
        for entry in file.monitors.iter_mut().chain(file.tasks.iter_mut()) {
            if entry.name == name {
                entry.enabled = enabled;
                found = true;
            }
        }
        if !found {
            return ToolResult::error(format!("no schedule entry named '{name}'"));
        }

        match file.save(ctx.schedule_file_path()) {
            Ok(()) => ToolResult::success(format!("Set '{name}' enabled={enabled}.")),
            Err(e) => ToolResult::error(format!("failed to save schedule file: {e}")),
        }
    }

    async fn remove(&self, ctx: &dyn ToolContext, file: &mut ScheduleFile, input: &serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return ToolResult::error("missing required parameter: name"),
        };

        let before = file.monitors.len() + file.tasks.len();
        file.monitors.retain(|e| e.name != name);
        file.tasks.retain(|e| e.name != name);
        if file.monitors.len() + file.tasks.len() == before {
            return ToolResult::error(format!("no schedule entry named '{name}'"));
        }

        match file.save(ctx.schedule_file_path()) {
            Ok(()) => ToolResult::success(format!("Removed '{name}'.")),
            Err(e) => ToolResult::error(format!("failed to save schedule file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;

    #[tokio::test]
    async fn add_list_remove_roundtrip() {
        let ctx = TestContext::unrestricted();
        let added = ScheduleTool
            .execute(
                &ctx,
                serde_json::json!({"action": "add", "kind": "task", "name": "cleanup", "prompt": "tidy up", "interval": "1h"}),
            )
            .await;
        assert!(!added.is_error, "{}", added.content);

        let listed = ScheduleTool.execute(&ctx, serde_json::json!({"action": "list"})).await;
        assert!(listed.content.contains("cleanup"));

        let removed = ScheduleTool.execute(&ctx, serde_json::json!({"action": "remove", "name": "cleanup"})).await;
        assert!(!removed.is_error);

        let listed_after = ScheduleTool.execute(&ctx, serde_json::json!({"action": "list"})).await;
        assert!(!listed_after.content.contains("cleanup"));
    }

    #[tokio::test]
    async fn add_rejects_invalid_interval() {
        let ctx = TestContext::unrestricted();
        let result = ScheduleTool
            .execute(
                &ctx,
                serde_json::json!({"action": "add", "name": "x", "prompt": "p", "interval": "whenever"}),
            )
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn set_enabled_toggles_existing_entry() {
        let ctx = TestContext::unrestricted();
        ScheduleTool
            .execute(
                &ctx,
                serde_json::json!({"action": "add", "name": "watcher", "prompt": "p", "interval": "5m"}),
            )
            .await;
        let result = ScheduleTool
            .execute(&ctx, serde_json::json!({"action": "set_enabled", "name": "watcher", "enabled": false}))
            .await;
        assert!(!result.is_error);

        let file = ScheduleFile::load(&ctx.schedule_file_path).unwrap();
        let entry = file.all_entries().find(|e| e.name == "watcher").unwrap();
        assert!(!entry.enabled);
    }
}
