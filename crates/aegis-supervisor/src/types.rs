use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to launch a single tool-server subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// Result of a `tools/call` RPC, with the spec's error-carrying convention:
/// an RPC-level error becomes a tool result with `is_error = true` rather
/// than a fatal call failure.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub text: String,
    pub is_error: bool,
}

/// Outcome of one server's connect attempt, as reported by `ConnectAll`.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub server: String,
    pub ok: bool,
    pub error: Option<String>,
}
