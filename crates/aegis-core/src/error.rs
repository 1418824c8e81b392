use thiserror::Error;

/// Top-level error taxonomy for the engine (see spec §7).
///
/// Each variant maps to a documented recovery policy enforced by its caller —
/// this enum only classifies; callers decide whether to surface, retry, or
/// swallow.
#[derive(Debug, Error)]
pub enum AegisError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("tool-server RPC error ({server}): {message}")]
    ToolServerRpc { server: String, message: String },

    #[error("tool-server not connected: {0}")]
    ToolServerNotConnected(String),

    #[error("tool validation failed: {0}")]
    ToolValidation(String),

    #[error("invalid tool name format: {0}")]
    InvalidToolName(String),

    #[error("loop detected")]
    LoopDetected,

    #[error("query timed out after {secs}s")]
    QueryTimeout { secs: u64 },

    #[error("path/command policy violation: {0}")]
    PolicyViolation(String),

    #[error("knowledge graph error: {0}")]
    KnowledgeGraph(String),

    #[error("chat backend error: {0}")]
    ChatBackend(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AegisError {
    /// Short error code attached to audit-log entries and CLI exit messages.
    pub fn code(&self) -> &'static str {
        match self {
            AegisError::Config(_) => "CONFIG_ERROR",
            AegisError::ToolServerRpc { .. } => "TOOL_SERVER_RPC_ERROR",
            AegisError::ToolServerNotConnected(_) => "TOOL_SERVER_NOT_CONNECTED",
            AegisError::ToolValidation(_) => "TOOL_VALIDATION_ERROR",
            AegisError::InvalidToolName(_) => "INVALID_TOOL_NAME",
            AegisError::LoopDetected => "LOOP_DETECTED",
            AegisError::QueryTimeout { .. } => "QUERY_TIMEOUT",
            AegisError::PolicyViolation(_) => "POLICY_VIOLATION",
            AegisError::KnowledgeGraph(_) => "KNOWLEDGE_GRAPH_ERROR",
            AegisError::ChatBackend(_) => "CHAT_BACKEND_ERROR",
            AegisError::Database(_) => "DATABASE_ERROR",
            AegisError::Serialization(_) => "SERIALIZATION_ERROR",
            AegisError::Io(_) => "IO_ERROR",
            AegisError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AegisError>;
