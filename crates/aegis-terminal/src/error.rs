//! Error types for the aegis-terminal crate.

use thiserror::Error;

/// All errors that can originate from terminal/filesystem tool operations.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// Child-process spawn failed.
    #[error("spawn error: {0}")]
    Spawn(String),

    /// Underlying I/O failure (read, write, flush).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation exceeded its time budget.
    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Command was rejected by the denylist safety checker.
    #[error("command blocked: {reason}")]
    CommandBlocked { reason: String },

    /// Command's basename is not in the configured allow-list.
    #[error("command not allowed: {0}")]
    CommandNotAllowed(String),

    /// Path fell outside every configured allowed root.
    #[error("path not allowed: {0}")]
    PathNotAllowed(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TerminalError>;
