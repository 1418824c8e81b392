//! Path and command allow-list policy for the internal filesystem/exec tools
//! (spec §4.E). This sits in front of [`crate::safety::check_command`]: the
//! safety denylist is a baseline net against obviously destructive commands,
//! while `CommandPolicy`/`PathPolicy` are the operator-configured allow-lists
//! that decide whether a *specific* tool call is permitted at all.

use std::path::{Path, PathBuf};

/// Restricts filesystem tool access to a configured set of root paths.
/// An empty list means unrestricted (matches the spec's "empty list =
/// unrestricted").
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    allowed_paths: Vec<PathBuf>,
}

impl PathPolicy {
    pub fn new(allowed_paths: Vec<PathBuf>) -> Self {
        Self { allowed_paths }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Check that `path` is resolvable and falls under one of the allowed
    /// roots. Resolves `path` via `canonicalize` when it exists; falls back
    /// to lexical comparison against the allowed roots for not-yet-existing
    /// paths (e.g. a file about to be created).
    pub fn check(&self, path: &Path) -> Result<(), String> {
        if self.allowed_paths.is_empty() {
            return Ok(());
        }

        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        for root in &self.allowed_paths {
            let root_resolved = root.canonicalize().unwrap_or_else(|_| root.clone());
            if resolved.starts_with(&root_resolved) {
                return Ok(());
            }
        }

        Err(format!(
            "path {} is not under any allowed root",
            path.display()
        ))
    }
}

/// Restricts `execute_command` to a configured set of allowed basenames, with
/// an optional secondary list of tools that must prompt for confirmation
/// before acting even when otherwise allowed.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allowed_commands: Vec<String>,
    confirm_tools: Vec<String>,
}

impl CommandPolicy {
    pub fn new(allowed_commands: Vec<String>, confirm_tools: Vec<String>) -> Self {
        Self {
            allowed_commands,
            confirm_tools,
        }
    }

    /// Tokenize `command` and check whether its first token's basename is in
    /// the allow-list.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let Some(first) = command.split_whitespace().next() else {
            return false;
        };
        let basename = Path::new(first)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(first);
        self.allowed_commands.iter().any(|c| c == basename)
    }

    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        self.confirm_tools.iter().any(|t| t == tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_policy_allows_everything() {
        let policy = PathPolicy::unrestricted();
        assert!(policy.check(Path::new("/etc/passwd")).is_ok());
    }

    #[test]
    fn path_policy_rejects_paths_outside_allowed_roots() {
        let policy = PathPolicy::new(vec![PathBuf::from("/tmp")]);
        assert!(policy.check(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn command_policy_matches_on_basename_not_full_path() {
        let policy = CommandPolicy::new(vec!["ls".to_string()], vec![]);
        assert!(policy.is_command_allowed("/bin/ls -la"));
        assert!(!policy.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn confirm_tools_list_is_checked_independently() {
        let policy = CommandPolicy::new(vec!["ls".to_string()], vec!["create_directory".to_string()]);
        assert!(policy.requires_confirmation("create_directory"));
        assert!(!policy.requires_confirmation("read_file"));
    }
}
