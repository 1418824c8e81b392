//! Secret redaction for audit-log entries (spec §6). Values are redacted
//! both by key name (anything that looks like a credential field) and by
//! matching common secret value shapes, so a secret doesn't survive under
//! an innocuous key name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const REDACTED: &str = "[REDACTED]";
const MAX_AUDIT_VALUE_CHARS: usize = 1000;

static SECRET_KEY_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|secret|token|api[_-]?key|auth|credential|bearer|private[_-]?key|access[_-]?key)").unwrap()
});

static SECRET_VALUE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"sk-[A-Za-z0-9_-]{10,}").unwrap(),
        Regex::new(r"(?i)bearer\s+[A-Za-z0-9._-]{10,}").unwrap(),
        Regex::new(r"eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}").unwrap(), // JWT
        Regex::new(r"ghp_[A-Za-z0-9]{30,}").unwrap(),
    ]
});

/// Whether `name` looks like it names a secret-bearing variable (e.g. an
/// env var). Shares the same key-name pattern as [`redact_json`]'s
/// by-key-name pass — used by `aegis-tools`'s script-exec environment
/// filter (spec §4.E).
pub fn looks_like_secret_key(name: &str) -> bool {
    SECRET_KEY_NAMES.is_match(name)
}

/// Redact secret-shaped values from `text`, for use on free-form tool output
/// or command strings before they hit the audit log.
pub fn redact_text(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in SECRET_VALUE_PATTERNS.iter() {
        out = pattern.replace_all(&out, REDACTED).into_owned();
    }
    truncate(&out)
}

/// Recursively redact a JSON value (tool arguments or results) by key name,
/// then by value shape on any remaining string leaves, truncating long
/// strings to keep audit lines bounded.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if SECRET_KEY_NAMES.is_match(k) {
                    out.insert(k.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(k.clone(), redact_json(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::String(s) => Value::String(redact_text(s)),
        other => other.clone(),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_AUDIT_VALUE_CHARS {
        return s.to_string();
    }
    let truncated: String = s.chars().take(MAX_AUDIT_VALUE_CHARS).collect();
    format!("{truncated}... [truncated at {MAX_AUDIT_VALUE_CHARS} chars]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_by_key_name() {
        let input = json!({"username": "alice", "password": "hunter2"});
        let out = redact_json(&input);
        assert_eq!(out["password"], json!("[REDACTED]"));
        assert_eq!(out["username"], json!("alice"));
    }

    #[test]
    fn redacts_api_key_shaped_value_under_innocuous_key() {
        let input = json!({"note": "key is sk-abcdefghijklmnop"});
        let out = redact_json(&input);
        assert!(out["note"].as_str().unwrap().contains("[REDACTED]"));
        assert!(!out["note"].as_str().unwrap().contains("sk-abcdefghijklmnop"));
    }

    #[test]
    fn truncates_long_values() {
        let long = "a".repeat(2000);
        let input = json!({"output": long});
        let out = redact_json(&input);
        assert!(out["output"].as_str().unwrap().len() < 2000);
        assert!(out["output"].as_str().unwrap().contains("truncated"));
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let input = json!({"outer": {"token": "abc"}, "list": [{"secret": "x"}]});
        let out = redact_json(&input);
        assert_eq!(out["outer"]["token"], json!("[REDACTED]"));
        assert_eq!(out["list"][0]["secret"], json!("[REDACTED]"));
    }
}
