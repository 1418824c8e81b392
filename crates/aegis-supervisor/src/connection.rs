use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Result, SupervisorError};
use crate::protocol::{parse_response_line, RpcRequest, RpcResponse};
use crate::types::{CallResult, PromptDef, ServerSpec, ToolDef};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const STDIN_CLOSE_GRACE: Duration = Duration::from_secs(2);
const TERMINATE_GRACE: Duration = Duration::from_secs(1);
const READER_QUEUE_DEPTH: usize = 10;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;

/// One live connection to a tool-server subprocess.
pub struct ServerConnection {
    pub spec: ServerSpec,
    pub tools: Vec<ToolDef>,
    pub prompts: Vec<PromptDef>,
    child: Child,
    stdin: ChildStdin,
    next_id: AtomicU64,
    pending: PendingMap,
    reader_task: JoinHandle<()>,
    consumer_task: JoinHandle<()>,
}

impl ServerConnection {
    /// Spawn the subprocess, establish the line-delimited JSON stream, and
    /// perform the `initialize` handshake plus tool/prompt listing.
    pub async fn connect(name: &str, spec: ServerSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);
        cmd.envs(&spec.env);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            server: name.to_string(),
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| SupervisorError::Spawn {
            server: name.to_string(),
            message: "failed to capture stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SupervisorError::Spawn {
            server: name.to_string(),
            message: "failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take();

        let (tx, mut rx) = mpsc::channel::<RpcResponse>(READER_QUEUE_DEPTH);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_server = name.to_string();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_response_line(&line) {
                        Ok(Some(resp)) => {
                            if tx.send(resp).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(server = %reader_server, error = %e, "malformed frame from tool server"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!(server = %reader_server, error = %e, "stdout read error");
                        break;
                    }
                }
            }
        });

        if let Some(stderr) = stderr {
            let stderr_server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(server = %stderr_server, "stderr: {line}");
                }
            });
        }

        let consumer_pending = Arc::clone(&pending);
        let consumer_task = tokio::spawn(async move {
            while let Some(resp) = rx.recv().await {
                if let Some(id) = resp.id {
                    let mut guard = consumer_pending.lock().await;
                    if let Some(sender) = guard.remove(&id) {
                        let _ = sender.send(resp);
                    }
                }
            }
        });

        let mut conn = Self {
            spec,
            tools: Vec::new(),
            prompts: Vec::new(),
            child,
            stdin,
            next_id: AtomicU64::new(1),
            pending,
            reader_task,
            consumer_task,
        };

        tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.initialize(name))
            .await
            .map_err(|_| SupervisorError::HandshakeTimeout(name.to_string()))??;

        conn.tools = conn.list_tools(name).await?;
        conn.prompts = conn.list_prompts(name).await?;

        info!(server = name, tools = conn.tools.len(), prompts = conn.prompts.len(), "tool server connected");
        Ok(conn)
    }

    async fn initialize(&mut self, name: &str) -> Result<()> {
        self.rpc_call(name, "initialize", serde_json::json!({"protocolVersion": "2024-11-05"}))
            .await?;
        Ok(())
    }

    async fn list_tools(&mut self, name: &str) -> Result<Vec<ToolDef>> {
        let result = self.rpc_call(name, "tools/list", serde_json::json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(tools)
    }

    async fn list_prompts(&mut self, name: &str) -> Result<Vec<PromptDef>> {
        let result = self.rpc_call(name, "prompts/list", serde_json::json!({})).await?;
        let prompts = result
            .get("prompts")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(prompts)
    }

    /// Issue a `tools/call` RPC. RPC-level errors are carried as an
    /// `is_error` result rather than a fatal call failure.
    pub async fn call_tool(&mut self, name: &str, tool: &str, args: serde_json::Value) -> Result<CallResult> {
        match self
            .rpc_call(
                name,
                "tools/call",
                serde_json::json!({"name": tool, "arguments": args}),
            )
            .await
        {
            Ok(result) => Ok(CallResult {
                text: concatenate_text_parts(&result),
                is_error: result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false),
            }),
            Err(SupervisorError::Rpc { message, .. }) => Ok(CallResult {
                text: format!("Error: {message}"),
                is_error: true,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn get_prompt(
        &mut self,
        name: &str,
        prompt_name: &str,
        args: serde_json::Value,
    ) -> Result<Vec<crate::types::PromptMessage>> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.name == prompt_name)
            .cloned();
        if let Some(prompt) = prompt {
            for required in prompt.arguments.iter().filter(|a| a.required) {
                if args.get(&required.name).is_none() {
                    return Err(SupervisorError::MissingPromptArgument(required.name.clone()));
                }
            }
        }

        let result = self
            .rpc_call(
                name,
                "prompts/get",
                serde_json::json!({"name": prompt_name, "arguments": args}),
            )
            .await?;
        let messages = result
            .get("messages")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(messages)
    }

    async fn rpc_call(&mut self, name: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().await;
            guard.insert(id, tx);
        }

        let req = RpcRequest::new(id, method, params);
        let line = req.to_line()?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let resp = rx.await.map_err(|_| SupervisorError::Rpc {
            server: name.to_string(),
            message: "server closed connection before responding".to_string(),
        })?;

        if let Some(err) = resp.error {
            return Err(SupervisorError::Rpc {
                server: name.to_string(),
                message: err.message,
            });
        }
        Ok(resp.result.unwrap_or(serde_json::Value::Null))
    }

    /// Close stdin, wait up to 2s for a graceful exit, then escalate to
    /// terminate (SIGTERM) and, failing that, kill (SIGKILL) — mirroring
    /// `mcp_stdio_fix.py`'s `process.terminate()` then `process.kill()`
    /// two-stage escalation.
    pub async fn disconnect(mut self) {
        self.reader_task.abort();
        self.consumer_task.abort();

        drop(self.stdin);
        if tokio::time::timeout(STDIN_CLOSE_GRACE, self.child.wait()).await.is_ok() {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            terminate(pid);
        }
        #[cfg(not(unix))]
        let _ = self.child.start_kill();

        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await.is_ok() {
            return;
        }

        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// Send SIGTERM to a child process. Isolated here as the only `unsafe` call
/// in the crate.
#[cfg(unix)]
#[allow(unsafe_code)]
fn terminate(pid: u32) {
    // SAFETY: `pid` is obtained from a live `tokio::process::Child`, so it
    // names a real process owned by this program.
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

fn concatenate_text_parts(result: &serde_json::Value) -> String {
    result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
