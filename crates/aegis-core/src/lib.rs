pub mod config;
pub mod error;
pub mod ids;

pub use config::AegisConfig;
pub use error::{AegisError, Result};
