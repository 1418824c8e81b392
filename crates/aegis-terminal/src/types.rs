//! Shared data types for aegis-terminal.

use serde::{Deserialize, Serialize};

/// Result returned by `TerminalManager::exec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Process exit code (0 = success).
    pub exit_code: i32,

    /// Captured standard output (ANSI escapes already stripped).
    pub stdout: String,

    /// Captured standard error (ANSI escapes already stripped).
    pub stderr: String,
}

/// Configuration knobs for one-shot command execution.
///
/// Callers that want sensible defaults can use `ExecOptions::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Timeout in seconds. The child is killed if it runs longer.
    ///
    /// Clamped to a maximum of 300 seconds per spec §4.E. `None` means no
    /// timeout is imposed — only valid when a user-confirmation callback is
    /// present (interactive mode).
    pub timeout_secs: Option<u64>,

    /// Maximum characters in the combined output before truncation.
    pub max_output_chars: usize,

    /// When `true`, the denylist safety checker is bypassed entirely.
    ///
    /// Only set this for callers that have already validated the command
    /// through a separate policy layer (e.g. the allowed-commands check in
    /// `policy::CommandPolicy`, which runs before `exec` is ever called).
    pub skip_safety: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout_secs: Some(30),
            max_output_chars: 30_000,
            skip_safety: false,
        }
    }
}

impl ExecOptions {
    /// Clamp `timeout_secs` to the hard maximum (300 s); `None` (interactive,
    /// no timeout) passes through unchanged.
    pub(crate) fn effective_timeout_secs(&self) -> Option<u64> {
        self.timeout_secs.map(|t| t.min(300))
    }
}
