//! aegis-terminal — filesystem-scoped one-shot command execution backing the
//! `execute_command`/`bash` internal tools.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use aegis_terminal::manager::TerminalManager;
//! use aegis_terminal::types::ExecOptions;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mgr = TerminalManager::new();
//!     let result = mgr.exec("echo hello", ExecOptions::default()).await.unwrap();
//!     println!("{}", result.stdout);
//! }
//! ```

pub mod error;
pub mod manager;
pub mod policy;
pub mod safety;
pub mod truncate;
pub mod types;

pub use error::{Result, TerminalError};
pub use manager::TerminalManager;
pub use policy::{CommandPolicy, PathPolicy};
pub use types::{ExecOptions, ExecResult};
