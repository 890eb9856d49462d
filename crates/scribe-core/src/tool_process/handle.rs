//! Owned lifecycle of one auxiliary tool process.
//!
//! A [`ToolProcessHandle`] is created by [`ToolProcessHandle::acquire`] and
//! lives in exactly one run's [`ToolSet`]. Requests through a handle are
//! serialised by an async mutex, so at most one stage call is in flight per
//! process. [`ToolProcessHandle::release`] is idempotent and always leaves
//! the handle `Closed`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{ToolProcessError, ToolResult};
use super::spec::{ToolKind, ToolProcessSpec};

const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

/// Lifecycle status of a tool process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Starting,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolStatus::Starting => "starting",
            ToolStatus::Ready => "ready",
            ToolStatus::Closing => "closing",
            ToolStatus::Closed => "closed",
            ToolStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Request/response channel to a running tool process.
#[async_trait]
pub trait ToolChannel: Send {
    /// Send one request and wait for its response.
    async fn request(&mut self, method: &str, params: Value) -> ToolResult<Value>;

    /// Ask the process to stop, waiting at most `grace` before killing it.
    async fn shutdown(&mut self, grace: Duration) -> ToolResult<()>;
}

/// Spawns tool processes and completes their readiness handshake.
///
/// `launch` returns only once the process has signalled readiness.
#[async_trait]
pub trait ToolLauncher: Send + Sync {
    async fn launch(&self, spec: &ToolProcessSpec) -> ToolResult<Box<dyn ToolChannel>>;
}

struct Inner {
    status: ToolStatus,
    channel: Option<Box<dyn ToolChannel>>,
}

/// Exclusive owner of one running tool process.
pub struct ToolProcessHandle {
    spec: ToolProcessSpec,
    inner: Mutex<Inner>,
}

/// Snapshot of a handle for run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub id: String,
    pub kind: ToolKind,
    pub status: ToolStatus,
}

impl ToolProcessHandle {
    /// Spawn the process and wait up to `spec.readiness_timeout` for it to be
    /// ready.
    ///
    /// When the deadline passes the launch future is dropped, which kills a
    /// half-started child.
    pub async fn acquire(launcher: &dyn ToolLauncher, spec: ToolProcessSpec) -> ToolResult<Self> {
        debug!(tool_id = %spec.id, command = %spec.command, "starting tool process");
        let started = Instant::now();

        let channel = match tokio::time::timeout(spec.readiness_timeout, launcher.launch(&spec))
            .await
        {
            Ok(launched) => launched?,
            Err(_elapsed) => {
                return Err(ToolProcessError::StartupTimeout {
                    id: spec.id.clone(),
                    timeout_ms: spec.readiness_timeout.as_millis() as u64,
                })
            }
        };

        crate::obs::emit_tool_acquired(
            &spec.id,
            spec.kind,
            started.elapsed().as_millis() as u64,
        );

        Ok(Self {
            spec,
            inner: Mutex::new(Inner {
                status: ToolStatus::Ready,
                channel: Some(channel),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn kind(&self) -> ToolKind {
        self.spec.kind
    }

    pub async fn status(&self) -> ToolStatus {
        self.inner.lock().await.status
    }

    pub async fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.spec.id.clone(),
            kind: self.spec.kind,
            status: self.status().await,
        }
    }

    /// Send one request, bounded by `spec.request_timeout`.
    ///
    /// Waits for any in-flight request on this handle to finish first.
    pub async fn request(&self, method: &str, params: Value) -> ToolResult<Value> {
        let mut inner = self.inner.lock().await;
        let status = inner.status;
        if status != ToolStatus::Ready {
            return Err(self.not_ready(status));
        }
        let Some(channel) = inner.channel.as_mut() else {
            return Err(self.not_ready(status));
        };

        let outcome =
            tokio::time::timeout(self.spec.request_timeout, channel.request(method, params)).await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if matches!(
                    err,
                    ToolProcessError::Io(_) | ToolProcessError::ProcessExitedEarly { .. }
                ) {
                    inner.status = ToolStatus::Failed;
                }
                Err(err)
            }
            Err(_elapsed) => Err(ToolProcessError::RequestTimeout {
                id: self.spec.id.clone(),
                method: method.to_string(),
                timeout_ms: self.spec.request_timeout.as_millis() as u64,
            }),
        }
    }

    /// Invoke a named tool (`tools/call`) and return its text content.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult<String> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        tool_text(&self.spec.id, name, &result)
    }

    /// Shut the process down. Idempotent: later calls return immediately.
    ///
    /// Shutdown errors are logged, never returned; the handle ends `Closed`
    /// regardless.
    pub async fn release(&self) -> ToolStatus {
        let mut inner = self.inner.lock().await;
        if matches!(inner.status, ToolStatus::Closed | ToolStatus::Closing) {
            return inner.status;
        }
        inner.status = ToolStatus::Closing;

        if let Some(channel) = inner.channel.take() {
            shut_down(&self.spec.id, channel, self.spec.shutdown_grace).await;
        }

        inner.status = ToolStatus::Closed;
        crate::obs::emit_tool_released(&self.spec.id, inner.status);
        inner.status
    }

    fn not_ready(&self, status: ToolStatus) -> ToolProcessError {
        ToolProcessError::NotReady {
            id: self.spec.id.clone(),
            status: status.to_string(),
        }
    }
}

/// Graceful shutdown bounded by `grace` plus a margin for a kill that itself
/// hangs. Errors are logged.
async fn shut_down(id: &str, mut channel: Box<dyn ToolChannel>, grace: Duration) {
    let bound = grace + SHUTDOWN_MARGIN;
    match tokio::time::timeout(bound, channel.shutdown(grace)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => crate::obs::emit_tool_release_error(id, &err),
        Err(_elapsed) => crate::obs::emit_tool_release_error(
            id,
            &format!("shutdown exceeded {}ms", bound.as_millis()),
        ),
    }
}

/// A handle dropped while still open (its run future was dropped or aborted)
/// hands the process to a background shutdown task. Outside a runtime the
/// process is only killed through `kill_on_drop`.
impl Drop for ToolProcessHandle {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let Some(channel) = inner.channel.take() else {
            return;
        };
        inner.status = ToolStatus::Closed;

        let id = self.spec.id.clone();
        let grace = self.spec.shutdown_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(tool_id = %id, "tool handle dropped without release; shutting down in background");
                runtime.spawn(async move {
                    shut_down(&id, channel, grace).await;
                    crate::obs::emit_tool_released(&id, ToolStatus::Closed);
                });
            }
            Err(_) => {
                warn!(tool_id = %id, "tool handle dropped outside a runtime; process will be killed");
                drop(channel);
            }
        }
    }
}

/// Extract the text content of an MCP `tools/call` result.
fn tool_text(id: &str, tool: &str, result: &Value) -> ToolResult<String> {
    let text = result["content"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p["type"] == "text")
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .ok_or_else(|| ToolProcessError::Protocol {
            id: id.to_string(),
            message: format!("{tool} result has no content array"),
        })?;

    if result["isError"].as_bool().unwrap_or(false) {
        return Err(ToolProcessError::ToolReported {
            id: id.to_string(),
            tool: tool.to_string(),
            message: text,
        });
    }
    Ok(text)
}

/// The tool processes owned by one run.
#[derive(Default)]
pub struct ToolSet {
    handles: Vec<ToolProcessHandle>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ToolProcessHandle) {
        self.handles.push(handle);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&ToolProcessHandle> {
        self.handles.iter().find(|h| h.kind() == kind)
    }

    /// Like [`ToolSet::get`], but a missing tool is an error.
    pub fn require(&self, kind: ToolKind) -> ToolResult<&ToolProcessHandle> {
        self.get(kind).ok_or_else(|| ToolProcessError::Missing {
            kind: kind.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle concurrently and report their final status.
    pub async fn release_all(&self) -> Vec<ToolSummary> {
        futures::future::join_all(self.handles.iter().map(|h| h.release())).await;
        let mut summaries = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            summaries.push(handle.summary().await);
        }
        summaries
    }
}
