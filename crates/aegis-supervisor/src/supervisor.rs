use std::collections::HashMap;

use tracing::{info, warn};

use crate::connection::ServerConnection;
use crate::error::{Result, SupervisorError};
use crate::types::{CallResult, ConnectOutcome, PromptDef, PromptMessage, ServerSpec, ToolDef};

/// Owns every connected tool-server and exposes the public operations from
/// spec §4.A. Callers hold one `Supervisor` for the lifetime of the process.
#[derive(Default)]
pub struct Supervisor {
    servers: HashMap<String, ServerConnection>,
    specs: HashMap<String, ServerSpec>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan out connection attempts across all `specs`; each gets up to 10s
    /// internally via `ServerConnection::connect`'s handshake timeout.
    /// Partial failures are reported, not aborted on.
    pub async fn connect_all(&mut self, specs: HashMap<String, ServerSpec>) -> Vec<ConnectOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            self.specs.insert(name.clone(), spec.clone());
            match ServerConnection::connect(&name, spec).await {
                Ok(conn) => {
                    self.servers.insert(name.clone(), conn);
                    outcomes.push(ConnectOutcome { server: name, ok: true, error: None });
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "failed to connect tool server");
                    outcomes.push(ConnectOutcome {
                        server: name,
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        outcomes
    }

    pub async fn call(&mut self, server: &str, tool: &str, args: serde_json::Value) -> Result<CallResult> {
        let conn = self
            .servers
            .get_mut(server)
            .ok_or_else(|| SupervisorError::NotConnected(server.to_string()))?;
        conn.call_tool(server, tool, args).await
    }

    pub async fn get_prompt(
        &mut self,
        server: &str,
        name: &str,
        args: serde_json::Value,
    ) -> Result<Vec<PromptMessage>> {
        let conn = self
            .servers
            .get_mut(server)
            .ok_or_else(|| SupervisorError::NotConnected(server.to_string()))?;
        conn.get_prompt(server, name, args).await
    }

    pub async fn disconnect(&mut self, server: &str) {
        if let Some(conn) = self.servers.remove(server) {
            conn.disconnect().await;
            info!(server, "tool server disconnected");
        }
    }

    pub async fn restart(&mut self, server: &str) -> Result<()> {
        let spec = self
            .specs
            .get(server)
            .cloned()
            .ok_or_else(|| SupervisorError::NotConnected(server.to_string()))?;
        self.disconnect(server).await;
        let conn = ServerConnection::connect(server, spec).await?;
        self.servers.insert(server.to_string(), conn);
        Ok(())
    }

    /// Diff `new_specs` against the currently-connected set by name:
    /// disconnect servers that were removed, connect servers that are new,
    /// restart servers whose spec changed.
    pub async fn reload_from_spec(&mut self, new_specs: HashMap<String, ServerSpec>) -> Vec<ConnectOutcome> {
        let mut outcomes = Vec::new();

        let removed: Vec<String> = self
            .specs
            .keys()
            .filter(|name| !new_specs.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            self.disconnect(&name).await;
            self.specs.remove(&name);
        }

        let mut to_connect = HashMap::new();
        for (name, spec) in &new_specs {
            match self.specs.get(name) {
                None => {
                    to_connect.insert(name.clone(), spec.clone());
                }
                Some(existing) if existing != spec => {
                    self.specs.insert(name.clone(), spec.clone());
                    if let Err(e) = self.restart(name).await {
                        warn!(server = %name, error = %e, "restart after spec reload failed");
                        outcomes.push(ConnectOutcome {
                            server: name.clone(),
                            ok: false,
                            error: Some(e.to_string()),
                        });
                    } else {
                        outcomes.push(ConnectOutcome { server: name.clone(), ok: true, error: None });
                    }
                }
                Some(_) => {}
            }
        }

        outcomes.extend(self.connect_all(to_connect).await);
        outcomes
    }

    pub fn tools(&self, server: &str) -> Option<&[ToolDef]> {
        self.servers.get(server).map(|c| c.tools.as_slice())
    }

    pub fn prompts(&self, server: &str) -> Option<&[PromptDef]> {
        self.servers.get(server).map(|c| c.prompts.as_slice())
    }

    pub fn all_tools(&self) -> Vec<(String, ToolDef)> {
        self.servers
            .iter()
            .flat_map(|(name, conn)| conn.tools.iter().map(move |t| (name.clone(), t.clone())))
            .collect()
    }

    pub fn is_connected(&self, server: &str) -> bool {
        self.servers.contains_key(server)
    }
}
