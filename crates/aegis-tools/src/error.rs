use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("knowledge graph error: {0}")]
    Kg(#[from] aegis_kg::KgError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] aegis_scheduler::SchedulerError),

    #[error("{0}")]
    Denied(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;
