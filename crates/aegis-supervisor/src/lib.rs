pub mod connection;
pub mod error;
pub mod protocol;
pub mod supervisor;
pub mod types;

pub use error::{Result, SupervisorError};
pub use supervisor::Supervisor;
pub use types::{CallResult, ConnectOutcome, PromptArgument, PromptDef, PromptMessage, ServerSpec, ToolDef};
