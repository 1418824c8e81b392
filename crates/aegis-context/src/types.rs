use serde::{Deserialize, Serialize};

/// Token usage reported by the chat backend for a single turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation: Option<u64>,
    pub cache_read: Option<u64>,
}

/// One round of tool use: the tool_result blocks that followed a single
/// assistant turn. Masking replaces `content` in-place on old rounds while
/// leaving `id` untouched so the correlation between a tool_use and its
/// tool_result survives.
#[derive(Debug, Clone)]
pub struct ToolResultBlock {
    pub id: String,
    pub content: String,
}

pub type ToolRound = Vec<ToolResultBlock>;

/// A single user/assistant exchange, the unit compaction operates on.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}
