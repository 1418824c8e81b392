pub mod error;
pub mod fingerprint;
pub mod redact;
pub mod sanitize;
pub mod validate;

pub use error::SecurityError;
pub use fingerprint::{ChangeKind, ToolChange, ToolDefinition, ToolDefinitionRegistry};
pub use redact::{looks_like_secret_key, redact_json, redact_text};
pub use sanitize::{sanitize_tool_result, SUSPICIOUS_CONTENT_PREFIX, SUSPICIOUS_CONTENT_SUFFIX};
pub use validate::{validate_tool_description, validate_tool_description_default};
