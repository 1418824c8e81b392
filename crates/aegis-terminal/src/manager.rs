//! `TerminalManager` — one-shot command execution backing the
//! `execute_command`/`bash` internal tools (spec §4.E).

use crate::{
    error::{Result, TerminalError},
    safety,
    truncate,
    types::{ExecOptions, ExecResult},
};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Executes shell commands with safety checking, optional timeout, and
/// output truncation. Stateless aside from what the caller passes in —
/// allow-list policy lives one layer up in `aegis-tools`.
#[derive(Default)]
pub struct TerminalManager;

impl TerminalManager {
    pub fn new() -> Self {
        Self
    }

    /// Execute `command` via `sh -c` with safety checking, timeout, and
    /// output truncation.
    ///
    /// Uses `tokio::process::Command` so the timeout future can race against
    /// the child without blocking the Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `CommandBlocked` — command was rejected by the denylist safety checker.
    /// - `Timeout`        — child exceeded `options.timeout_secs`.
    /// - `Spawn`          — child could not be spawned.
    /// - `IoError`        — underlying I/O failure.
    pub async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        debug!("exec: {command}");

        if !options.skip_safety {
            safety::check_command(command)
                .map_err(|reason| TerminalError::CommandBlocked { reason })?;
        }

        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| TerminalError::Spawn(format!("spawn failed: {e}")))?;

        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        let Some(timeout_secs) = options.effective_timeout_secs() else {
            // Interactive mode: no timeout imposed.
            return match rx.await {
                Ok(Ok(output)) => Ok(to_exec_result(output, options.max_output_chars)),
                Ok(Err(e)) => Err(TerminalError::IoError(e)),
                Err(_) => Err(TerminalError::Spawn(
                    "wait task panicked unexpectedly".to_string(),
                )),
            };
        };

        let timeout_duration = std::time::Duration::from_secs(timeout_secs);
        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(Ok(output))) => Ok(to_exec_result(output, options.max_output_chars)),
            Ok(Ok(Err(e))) => Err(TerminalError::IoError(e)),
            Ok(Err(_recv_err)) => Err(TerminalError::Spawn(
                "wait task panicked unexpectedly".to_string(),
            )),
            Err(_elapsed) => {
                if let Some(raw_pid) = pid {
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = std::process::Command::new("taskkill")
                            .args(["/F", "/PID", &raw_pid.to_string()])
                            .output();
                    }
                }
                Err(TerminalError::Timeout {
                    ms: timeout_secs * 1_000,
                })
            }
        }
    }
}

fn to_exec_result(output: std::process::Output, max_output_chars: usize) -> ExecResult {
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = truncate::truncate_output(&strip_text(&output.stdout), max_output_chars);
    let stderr = truncate::truncate_output(&strip_text(&output.stderr), max_output_chars);
    ExecResult {
        exit_code,
        stdout,
        stderr,
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_runs_simple_command() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("echo hello", ExecOptions::default()).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn exec_blocks_denylisted_command() {
        let mgr = TerminalManager::new();
        let result = mgr.exec("rm -rf /", ExecOptions::default()).await;
        assert!(matches!(result, Err(TerminalError::CommandBlocked { .. })));
    }

    #[tokio::test]
    async fn exec_times_out_long_running_command() {
        let mgr = TerminalManager::new();
        let options = ExecOptions {
            timeout_secs: Some(1),
            skip_safety: true,
            ..ExecOptions::default()
        };
        let result = mgr.exec("sleep 5", options).await;
        assert!(matches!(result, Err(TerminalError::Timeout { .. })));
    }
}
