use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to install watch on {path}: {source}")]
    Install { path: String, source: notify::Error },
}

pub type Result<T> = std::result::Result<T, WatchError>;
