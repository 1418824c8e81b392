use thiserror::Error;

#[derive(Debug, Error)]
pub enum KgError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("entity not found: {entity_type}:{entity_id}")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },

    #[error("invalid temporal bounds: {0}")]
    InvalidBounds(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
