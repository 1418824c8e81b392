use thiserror::Error;

/// Top-level CLI error. Each variant carries enough to print a useful
/// message and pick a process exit code; `main` never panics on these.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] aegis_core::AegisError),

    #[error("knowledge graph error: {0}")]
    KnowledgeGraph(#[from] aegis_kg::KgError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] aegis_scheduler::SchedulerError),

    #[error("provider error: {0}")]
    Provider(#[from] aegis_agent::provider::ProviderError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
