//! Skills system — `SKILL.md` instruction documents that teach the agent
//! how to handle a task, optionally backed by executable scripts (spec
//! §4.E, §4.H). Generalizes the teacher's `tools::skill` module: adds the
//! `allowed-tools` gate that `script_exec` consults before running a
//! script out of a skill's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::context::ToolContext;
use crate::{Tool, ToolResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires: SkillRequirements,
    /// Tools this skill may invoke. Empty means "no restriction" for
    /// ordinary tools, but `script_exec` additionally requires this list
    /// to name it explicitly, or requires the skill to declare scripts
    /// with an empty `allowed-tools` (spec §4.E).
    #[serde(default, rename = "allowed-tools")]
    pub allowed_tools: Vec<String>,
    /// Script entry points this skill ships, relative to the skill's
    /// directory.
    #[serde(default)]
    pub scripts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillRequirements {
    #[serde(default)]
    pub bins: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub os: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkillEntry {
    pub meta: SkillMeta,
    pub body: String,
    pub source: String,
    /// Directory this skill was loaded from — the root that `script_exec`
    /// targets must resolve under.
    pub dir: PathBuf,
}

impl SkillEntry {
    /// Whether `script_exec` may run a script from this skill: either the
    /// tool is explicitly named in `allowed-tools`, or `allowed-tools` is
    /// empty and the skill declares at least one script.
    pub fn permits_script_exec(&self, script_exec_tool_name: &str) -> bool {
        if self.meta.allowed_tools.iter().any(|t| t == script_exec_tool_name) {
            return true;
        }
        self.meta.allowed_tools.is_empty() && !self.meta.scripts.is_empty()
    }
}

/// Load all available skills from a user directory and a workspace
/// directory, the user directory's entries winning on name collision.
pub fn load_skills(user_dir: &Path, workspace_dir: &Path) -> Vec<SkillEntry> {
    let mut seen = HashSet::new();
    let mut skills = Vec::new();

    load_from_dir(user_dir, "user", &mut seen, &mut skills);
    if workspace_dir != user_dir {
        load_from_dir(workspace_dir, "workspace", &mut seen, &mut skills);
    }

    skills
}

fn load_from_dir(dir: &Path, source: &str, seen: &mut HashSet<String>, skills: &mut Vec<SkillEntry>) {
    if !dir.is_dir() {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_file = path.join("SKILL.md");
        if !skill_file.is_file() {
            continue;
        }
        let raw = match std::fs::read_to_string(&skill_file) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let (meta, body) = match parse_skill_md(&raw) {
            Some(parsed) => parsed,
            None => {
                debug!(path = %skill_file.display(), "skipping skill: invalid frontmatter");
                continue;
            }
        };
        if seen.contains(&meta.name) {
            continue;
        }
        if !check_requirements(&meta.requires) {
            debug!(name = %meta.name, "skipping skill: requirements not met");
            continue;
        }
        seen.insert(meta.name.clone());
        skills.push(SkillEntry {
            meta,
            body,
            source: source.to_string(),
            dir: path,
        });
    }
}

/// Parse a `SKILL.md` file: YAML frontmatter between `---` delimiters,
/// followed by a markdown body.
pub fn parse_skill_md(content: &str) -> Option<(SkillMeta, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }
    let after_first = &trimmed[3..];
    let closing_idx = after_first.find("\n---")?;
    let yaml_block = &after_first[..closing_idx];
    let body_start = closing_idx + 4;
    let body = if body_start < after_first.len() {
        after_first[body_start..].trim_start_matches('\n').to_string()
    } else {
        String::new()
    };
    let meta: SkillMeta = serde_yaml::from_str(yaml_block).ok()?;
    Some((meta, body))
}

pub fn check_requirements(req: &SkillRequirements) -> bool {
    if !req.os.is_empty() {
        let current_os = std::env::consts::OS;
        if !req.os.iter().any(|os| os.to_lowercase() == current_os) {
            return false;
        }
    }
    for var in &req.env {
        if std::env::var(var).is_err() {
            return false;
        }
    }
    for bin in &req.bins {
        if which(bin).is_none() {
            return false;
        }
    }
    true
}

fn which(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    for dir in path_var.split(':') {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Compact skill index for injection into the system prompt (spec's
/// system-prompt template §4.F: "[Agent Skills section if any installed;
/// includes per-skill script-exec hints iff enabled]").
pub fn format_skill_index(skills: &[SkillEntry], script_exec_enabled: bool) -> String {
    if skills.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n## Available skills (use skill_read for full instructions)\n");
    for skill in skills {
        let tags = if skill.meta.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", skill.meta.tags.join(","))
        };
        out.push_str(&format!("- {}: {}{}\n", skill.meta.name, skill.meta.description, tags));
        if script_exec_enabled && !skill.meta.scripts.is_empty() {
            out.push_str(&format!("  scripts: {}\n", skill.meta.scripts.join(", ")));
        }
    }
    out
}

pub struct SkillReadTool;

#[async_trait]
impl Tool for SkillReadTool {
    fn name(&self) -> &str {
        "skill_read"
    }

    fn description(&self) -> &str {
        "Read the full instructions for a skill by name. Skills are step-by-step \
         instruction documents (SKILL.md) that teach you how to handle specific tasks. \
         Use this when you see a relevant skill in the available skills list."
    }

    fn short_description(&self) -> Option<&str> {
        Some("Read a skill's full instructions.")
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string", "description": "Skill name, e.g. 'gmail-setup'."}},
            "required": ["name"]
        })
    }

    async fn execute(&self, ctx: &dyn ToolContext, input: serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|v| v.as_str()) {
            Some(n) if !n.trim().is_empty() => n.trim(),
            _ => return ToolResult::error("missing required parameter: name"),
        };

        match ctx.skills().iter().find(|s| s.meta.name == name) {
            Some(skill) => {
                let mut out = format!("# Skill: {}\n", skill.meta.name);
                out.push_str(&format!("> {}\n", skill.meta.description));
                if !skill.meta.tags.is_empty() {
                    out.push_str(&format!("> Tags: {}\n", skill.meta.tags.join(", ")));
                }
                out.push_str(&format!("> Source: {}\n\n", skill.source));
                out.push_str(&skill.body);
                ToolResult::success(out)
            }
            None => {
                let available: Vec<&str> = ctx.skills().iter().map(|s| s.meta.name.as_str()).collect();
                ToolResult::error(format!("skill '{name}' not found. Available: {}", available.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, name: &str, body: &str, frontmatter_extra: &str) {
        let skill_dir = dir.join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        let content = format!(
            "---\nname: {name}\ndescription: test skill\n{frontmatter_extra}\n---\n{body}\n"
        );
        std::fs::write(skill_dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "demo", "do the thing", "tags: [a, b]");
        let skills = load_skills(dir.path(), dir.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].meta.name, "demo");
        assert_eq!(skills[0].body.trim(), "do the thing");
        assert_eq!(skills[0].meta.tags, vec!["a", "b"]);
    }

    #[test]
    fn user_dir_wins_on_name_collision() {
        let user = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        write_skill(user.path(), "demo", "user version", "");
        write_skill(workspace.path(), "demo", "workspace version", "");
        let skills = load_skills(user.path(), workspace.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].source, "user");
        assert!(skills[0].body.contains("user version"));
    }

    #[test]
    fn permits_script_exec_when_named_in_allowed_tools() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "scripted", "body", "allowed-tools: [script_exec]\nscripts: [run.sh]");
        let skills = load_skills(dir.path(), dir.path());
        assert!(skills[0].permits_script_exec("script_exec"));
    }

    #[test]
    fn permits_script_exec_when_allowed_tools_empty_but_scripts_declared() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "scripted", "body", "scripts: [run.sh]");
        let skills = load_skills(dir.path(), dir.path());
        assert!(skills[0].permits_script_exec("script_exec"));
    }

    #[test]
    fn denies_script_exec_when_allowed_tools_set_without_it() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "scripted", "body", "allowed-tools: [read_file]\nscripts: [run.sh]");
        let skills = load_skills(dir.path(), dir.path());
        assert!(!skills[0].permits_script_exec("script_exec"));
    }

    #[test]
    fn skips_skill_with_unmet_env_requirement() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "gated", "body", "requires:\n  env: [SOME_VAR_THAT_IS_NOT_SET_XYZ]");
        let skills = load_skills(dir.path(), dir.path());
        assert!(skills.is_empty());
    }
}
