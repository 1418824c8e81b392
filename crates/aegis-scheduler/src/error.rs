use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON (de)serialization of a cadence, arguments blob, or cache payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No unit with the given name exists in the store.
    #[error("Unit not found: {name}")]
    UnitNotFound { name: String },

    /// A unit with this name is already registered.
    #[error("Unit already exists: {name}")]
    UnitAlreadyExists { name: String },

    /// Schedule-file I/O (read/write of the persisted JSON document).
    #[error("Schedule file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An `interval` string in the schedule file didn't match any supported grammar.
    #[error("Invalid interval expression: {0}")]
    InvalidInterval(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
