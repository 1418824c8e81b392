//! Append-only JSON-lines audit sink (spec §6): every tool invocation is
//! appended as one redacted, length-bounded JSON object to
//! `AegisConfig::paths::audit_log_path()`. `aegis_tools::audit` produces the
//! `AuditRecord` (already redacted via `aegis_security::redact_json`); this
//! sink is purely the persistence side the crate's doc comment calls out as
//! the CLI's responsibility.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use aegis_tools::audit::{AuditRecord, AuditSink};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

const RESULT_TEXT_MAX_CHARS: usize = 1000;
const RETENTION: i64 = 7;

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: DateTime<Utc>,
    tool_name: &'a str,
    arguments: &'a serde_json::Value,
    result_summary: &'a str,
    success: bool,
}

pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlAuditSink {
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Drop any line whose `timestamp` is older than the retention window
    /// (spec §6: "retain 7 days"). Rewrites the file in place; best-effort —
    /// a failure here is logged, not fatal.
    pub fn cleanup(&self) {
        if let Err(e) = self.cleanup_inner() {
            warn!(error = %e, path = %self.path.display(), "audit log cleanup failed");
        }
    }

    fn cleanup_inner(&self) -> std::io::Result<()> {
        let cutoff = Utc::now() - Duration::days(RETENTION);
        let contents = std::fs::read_to_string(&self.path)?;
        let mut kept = String::with_capacity(contents.len());
        for line in contents.lines() {
            let keep = serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("timestamp").and_then(|t| t.as_str().map(String::from)))
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc) >= cutoff)
                .unwrap_or(true);
            if keep {
                kept.push_str(line);
                kept.push('\n');
            }
        }
        let guard = self.file.lock().unwrap();
        std::fs::write(&self.path, kept)?;
        drop(guard);
        Ok(())
    }

    fn truncate(text: &str) -> String {
        if text.chars().count() <= RESULT_TEXT_MAX_CHARS {
            return text.to_string();
        }
        let total = text.chars().count();
        let head: String = text.chars().take(RESULT_TEXT_MAX_CHARS).collect();
        format!("{head}... [truncated, {total} chars total]")
    }

    fn append(&self, line: &str) {
        let mut file = self.file.lock().unwrap();
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "failed to append audit record");
        }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        let summary = Self::truncate(&record.result_text);
        let line = AuditLine {
            timestamp: Utc::now(),
            tool_name: &record.tool_name,
            arguments: &record.args,
            result_summary: &summary,
            success: !record.is_error,
        };
        match serde_json::to_string(&line) {
            Ok(s) => self.append(&s),
            Err(e) => warn!(error = %e, "failed to serialize audit record"),
        }
    }
}
