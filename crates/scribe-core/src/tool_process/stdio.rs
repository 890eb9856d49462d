//! MCP tool processes over stdio (newline-delimited JSON-RPC 2.0).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::error::{ToolProcessError, ToolResult};
use super::handle::{ToolChannel, ToolLauncher};
use super::spec::ToolProcessSpec;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Launches tool processes as local children speaking MCP over stdio.
#[derive(Debug, Clone, Default)]
pub struct StdioLauncher;

impl StdioLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolLauncher for StdioLauncher {
    async fn launch(&self, spec: &ToolProcessSpec) -> ToolResult<Box<dyn ToolChannel>> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ToolProcessError::Spawn {
            id: spec.id.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ToolProcessError::Protocol {
            id: spec.id.clone(),
            message: "child stdin not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ToolProcessError::Protocol {
            id: spec.id.clone(),
            message: "child stdout not captured".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let id = spec.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(tool_id = %id, stderr = %line);
                }
            });
        }

        let mut channel = StdioChannel {
            id: spec.id.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        };
        channel.handshake().await?;
        Ok(Box::new(channel))
    }
}

/// A running stdio child plus its JSON-RPC request counter.
pub struct StdioChannel {
    id: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioChannel {
    /// `initialize` request followed by the `initialized` notification.
    async fn handshake(&mut self) -> ToolResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "scribe", "version": crate::VERSION },
        });
        let result = self.exchange("initialize", params).await?;
        debug!(
            tool_id = %self.id,
            server = %result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "tool handshake complete"
        );
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        }))
        .await
    }

    async fn send(&mut self, message: &Value) -> ToolResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| ToolProcessError::NotReady {
            id: self.id.clone(),
            status: "closing".to_string(),
        })?;
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn exchange(&mut self, method: &str, params: Value) -> ToolResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let sent = self
            .send(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .await;
        match sent {
            Ok(()) => {}
            Err(ToolProcessError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Err(self.exited())
            }
            Err(e) => return Err(e),
        }

        loop {
            let line = match self.stdout.next_line().await? {
                Some(line) => line,
                None => return Err(self.exited()),
            };
            let message: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => {
                    debug!(tool_id = %self.id, line = %line, "skipping non-json output");
                    continue;
                }
            };
            // Notifications and responses to other ids are not ours.
            if message["id"].as_u64() != Some(id) {
                continue;
            }
            if let Some(error) = message.get("error") {
                return Err(ToolProcessError::Remote {
                    id: self.id.clone(),
                    code: error["code"].as_i64().unwrap_or(0),
                    message: error["message"].as_str().unwrap_or("").to_string(),
                });
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    fn exited(&mut self) -> ToolProcessError {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => "stdout closed".to_string(),
            Err(e) => e.to_string(),
        };
        ToolProcessError::ProcessExitedEarly {
            id: self.id.clone(),
            status,
        }
    }
}

#[async_trait]
impl ToolChannel for StdioChannel {
    async fn request(&mut self, method: &str, params: Value) -> ToolResult<Value> {
        self.exchange(method, params).await
    }

    async fn shutdown(&mut self, grace: Duration) -> ToolResult<()> {
        // Closing stdin is the stdio transport's shutdown signal.
        drop(self.stdin.take());
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(waited) => {
                let status = waited?;
                debug!(tool_id = %self.id, status = %status, "tool exited");
                Ok(())
            }
            Err(_elapsed) => {
                debug!(tool_id = %self.id, "grace period elapsed, killing tool");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}
