use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
