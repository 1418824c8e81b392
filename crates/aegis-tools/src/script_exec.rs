//! Script execution tool (spec §4.E): run a named script out of a named
//! installed skill. Disabled by default. Generalizes the teacher's
//! `tools::script_tool` plugin loader — which ran any `~/.skynet/tools/`
//! manifest unconditionally — into a narrower, skill-scoped surface: the
//! target path must resolve under the skill's own directory, the skill's
//! `allowed-tools` must permit this tool, and the subprocess environment is
//! filtered to strip anything that looks like a credential.

use std::time::Duration;

use async_trait::async_trait;
use aegis_security::looks_like_secret_key;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

const TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_BYTES: usize = 20 * 1024;

fn truncate(mut s: String) -> String {
    if s.len() > MAX_OUTPUT_BYTES {
        s.truncate(MAX_OUTPUT_BYTES);
        s.push_str(&format!("\n\n[truncated at {MAX_OUTPUT_BYTES} bytes]"));
    }
    s
}

pub struct ScriptExecTool;

#[async_trait]
impl Tool for ScriptExecTool {
    fn name(&self) -> &str {
        "script_exec"
    }

    fn description(&self) -> &str {
        "Run a named script from a named installed skill. Disabled by default. The \
         script's path must resolve under the skill's own directory and the skill must \
         declare this tool in its allowed-tools (or leave allowed-tools empty while \
         declaring scripts). The subprocess runs with a filtered environment — \
         credential-shaped variables are stripped, PATH is preserved — a 30s timeout, \
         and output capped at 20 KB."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Run a script from an installed skill.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill": {"type": "string", "description": "Name of the installed skill."},
                "script": {"type": "string", "description": "Script filename relative to the skill's directory."},
                "args": {"type": "array", "items": {"type": "string"}, "description": "Arguments to pass to the script."}
            },
            "required": ["skill", "script"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        if !ctx.script_exec_enabled() {
            return ToolResult::error("script execution is disabled");
        }

        let skill_name = match input.get("skill").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: skill"),
        };
        let script = match input.get("script").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s,
            _ => return ToolResult::error("missing required parameter: script"),
        };
        let args: Vec<String> = input
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let skills = ctx.skills();
        let skill = match skills.iter().find(|s| s.meta.name == skill_name) {
            Some(s) => s,
            None => return ToolResult::error(format!("no installed skill named '{skill_name}'")),
        };

        if !skill.permits_script_exec(self.name()) {
            return ToolResult::error(format!(
                "skill '{skill_name}' does not permit script execution (missing 'script_exec' in allowed-tools)"
            ));
        }
        if !skill.meta.scripts.iter().any(|s| s == script) {
            return ToolResult::error(format!("skill '{skill_name}' does not declare script '{script}'"));
        }

        let script_path = skill.dir.join(script);
        let canonical_dir = match skill.dir.canonicalize() {
            Ok(d) => d,
            Err(e) => return ToolResult::error(format!("failed to resolve skill directory: {e}")),
        };
        let canonical_script = match script_path.canonicalize() {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("script '{script}' not found: {e}")),
        };
        if !canonical_script.starts_with(&canonical_dir) {
            return ToolResult::error("script path escapes the skill directory");
        }

        let mut command = tokio::process::Command::new(&canonical_script);
        command.args(&args).current_dir(&canonical_dir).env_clear();
        for (key, value) in std::env::vars() {
            if key == "PATH" || !looks_like_secret_key(&key) {
                command.env(key, value);
            }
        }

        let run = command.output();
        match tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), run).await {
            Err(_) => ToolResult::error(format!("script '{script}' timed out after {TIMEOUT_SECS}s")),
            Ok(Err(e)) => ToolResult::error(format!("failed to launch script '{script}': {e}")),
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                if out.status.success() {
                    let content = if stdout.is_empty() { "(no output)".to_string() } else { stdout };
                    ToolResult::success(truncate(content))
                } else {
                    let mut msg = stdout;
                    if !stderr.is_empty() {
                        if !msg.is_empty() {
                            msg.push('\n');
                        }
                        msg.push_str(&format!("[stderr]: {stderr}"));
                    }
                    msg.push_str(&format!("\n[exit: {}]", out.status.code().unwrap_or(-1)));
                    ToolResult::error(truncate(msg))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::TestContext;
    use crate::skill::{SkillEntry, SkillMeta, SkillRequirements};

    fn make_skill(dir: &std::path::Path, allowed_tools: Vec<&str>) -> SkillEntry {
        std::fs::create_dir_all(dir).unwrap();
        let script_path = dir.join("run.sh");
        std::fs::write(&script_path, "#!/bin/sh\necho hello\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        SkillEntry {
            meta: SkillMeta {
                name: "demo".to_string(),
                description: "demo skill".to_string(),
                tags: vec![],
                requires: SkillRequirements::default(),
                allowed_tools: allowed_tools.into_iter().map(String::from).collect(),
                scripts: vec!["run.sh".to_string()],
            },
            body: String::new(),
            source: "workspace".to_string(),
            dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn denied_when_script_exec_disabled() {
        let ctx = TestContext::unrestricted();
        let result = ScriptExecTool
            .execute(&ctx, serde_json::json!({"skill": "demo", "script": "run.sh"}))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("disabled"));
    }

    #[tokio::test]
    async fn runs_script_when_enabled_and_permitted() {
        let mut ctx = TestContext::unrestricted();
        ctx.script_exec_enabled = true;
        let skill_dir = ctx._tmp.path().join("skills/demo");
        ctx.skills = vec![make_skill(&skill_dir, vec!["script_exec"])];

        let result = ScriptExecTool
            .execute(&ctx, serde_json::json!({"skill": "demo", "script": "run.sh"}))
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("hello"));
    }

    #[tokio::test]
    async fn denied_when_skill_does_not_permit_script_exec() {
        let mut ctx = TestContext::unrestricted();
        ctx.script_exec_enabled = true;
        let skill_dir = ctx._tmp.path().join("skills/demo");
        ctx.skills = vec![make_skill(&skill_dir, vec!["read_file"])];

        let result = ScriptExecTool
            .execute(&ctx, serde_json::json!({"skill": "demo", "script": "run.sh"}))
            .await;
        assert!(result.is_error);
    }
}
