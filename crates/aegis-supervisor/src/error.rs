use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("server not connected: {0}")]
    NotConnected(String),

    #[error("spawn failed for server {server}: {message}")]
    Spawn { server: String, message: String },

    #[error("handshake timed out for server {0}")]
    HandshakeTimeout(String),

    #[error("rpc error from server {server}: {message}")]
    Rpc { server: String, message: String },

    #[error("missing required prompt argument: {0}")]
    MissingPromptArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
