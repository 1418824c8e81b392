//! Audit sink for internal tool calls (spec §4.E: "All internal tools log
//! to an audit sink (§6) with secrets redacted ... on both arguments (by
//! key name) and result text").

use aegis_security::{redact_json, redact_text};
use serde::Serialize;
use tracing::info;

use crate::ToolResult;

/// One redacted audit record. `aegis-cli` persists these as append-only
/// JSON-lines (spec §6); this crate only produces them.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub result_text: String,
    pub is_error: bool,
}

/// Receives one [`AuditRecord`] per tool call. Implemented by `aegis-cli`'s
/// append-only log; a `tracing`-only default is provided for tests and
/// contexts that don't need persistence.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Logs via `tracing` with redaction applied; does not persist anywhere.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            tool = %record.tool_name,
            is_error = record.is_error,
            "tool call"
        );
        let _ = &record;
    }
}

/// Build a redacted [`AuditRecord`] from raw arguments and a tool result.
pub fn make_record(tool_name: &str, args: &serde_json::Value, result: &ToolResult) -> AuditRecord {
    AuditRecord {
        tool_name: tool_name.to_string(),
        args: redact_json(args),
        result_text: redact_text(&result.content),
        is_error: result.is_error,
    }
}
