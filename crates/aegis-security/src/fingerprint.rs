//! Rug-pull detection: tool definitions are fingerprinted at first connect
//! and re-checked on every reconnect. A server that silently changes what a
//! tool does after the user has already approved it is the attack this
//! guards against.

use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Minimal view of a tool definition sufficient to fingerprint it. Servers
/// may attach extra bookkeeping fields (e.g. which server it came from) —
/// those are intentionally excluded from the hash.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// SHA-256 hex digest over the canonical (sorted-key) JSON encoding of
/// `{name, description, input_schema}`.
pub fn compute_tool_fingerprint(def: &ToolDefinition) -> String {
    let canonical = canonical_json(def);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_json(def: &ToolDefinition) -> String {
    // serde_json's Map is a BTreeMap by default only with the `preserve_order`
    // feature disabled; this crate relies on that default so key order is
    // already sorted when we serialize via `serde_json::Value`.
    let value = serde_json::json!({
        "name": def.name,
        "description": def.description,
        "input_schema": def.input_schema,
    });
    serde_json::to_string(&value).expect("tool definition must serialize")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolChange {
    pub tool_name: String,
    pub change_type: ChangeKind,
}

/// Tracks fingerprints of registered tool definitions and reports drift.
#[derive(Default)]
pub struct ToolDefinitionRegistry {
    fingerprints: HashMap<String, String>,
}

impl ToolDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tools(&mut self, tools: &[ToolDefinition]) {
        for tool in tools {
            self.fingerprints
                .insert(tool.name.clone(), compute_tool_fingerprint(tool));
        }
    }

    /// Compare `tools` against the stored fingerprints, returning every
    /// added, modified, or removed tool. Does not mutate the registry —
    /// call `register_tools` separately once changes are accepted.
    pub fn check_for_changes(&self, tools: &[ToolDefinition]) -> Vec<ToolChange> {
        let mut changes = Vec::new();
        let mut current_names = std::collections::HashSet::new();

        for tool in tools {
            current_names.insert(tool.name.clone());
            let fingerprint = compute_tool_fingerprint(tool);
            match self.fingerprints.get(&tool.name) {
                None => changes.push(ToolChange {
                    tool_name: tool.name.clone(),
                    change_type: ChangeKind::Added,
                }),
                Some(existing) if existing != &fingerprint => changes.push(ToolChange {
                    tool_name: tool.name.clone(),
                    change_type: ChangeKind::Modified,
                }),
                Some(_) => {}
            }
        }

        for name in self.fingerprints.keys() {
            if !current_names.contains(name) {
                changes.push(ToolChange {
                    tool_name: name.clone(),
                    change_type: ChangeKind::Removed,
                });
            }
        }

        changes
    }

    pub fn get_fingerprint(&self, tool_name: &str) -> Option<&str> {
        self.fingerprints.get(tool_name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let d = def("read_file", "Reads a file");
        assert_eq!(compute_tool_fingerprint(&d), compute_tool_fingerprint(&d));
    }

    #[test]
    fn fingerprint_changes_when_description_changes() {
        let a = def("read_file", "Reads a file");
        let b = def("read_file", "Reads a file and exfiltrates it");
        assert_ne!(compute_tool_fingerprint(&a), compute_tool_fingerprint(&b));
    }

    #[test]
    fn registry_detects_modification_after_registration() {
        let mut registry = ToolDefinitionRegistry::new();
        let original = vec![def("read_file", "Reads a file")];
        registry.register_tools(&original);

        let changed = vec![def("read_file", "Reads a file, then emails it to attacker")];
        let changes = registry.check_for_changes(&changed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeKind::Modified);
    }

    #[test]
    fn registry_detects_added_and_removed() {
        let mut registry = ToolDefinitionRegistry::new();
        registry.register_tools(&[def("a", "tool a"), def("b", "tool b")]);

        let changes = registry.check_for_changes(&[def("a", "tool a"), def("c", "tool c")]);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .any(|c| c.tool_name == "c" && c.change_type == ChangeKind::Added));
        assert!(changes
            .iter()
            .any(|c| c.tool_name == "b" && c.change_type == ChangeKind::Removed));
    }
}
