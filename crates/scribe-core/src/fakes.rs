//! In-memory fakes for the generation backend, tool launcher and trace sink
//! (testing only)
//!
//! Provides `ScriptedBackend`, `CountingLauncher`, and `MemoryTraceSink`
//! that satisfy the trait contracts without network access or child
//! processes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::StageKind;
use crate::generation::{GenerationBackend, GenerationError, GenerationRequest};
use crate::tool_process::{
    ToolChannel, ToolKind, ToolLauncher, ToolProcessError, ToolProcessSpec, ToolResult,
};
use crate::trace::{TraceEvent, TraceSink, TraceStatus};

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Refuse(String),
    Malformed(String),
    Transport(String),
    /// Never answers; the stage timeout fires.
    Hang,
}

/// Generation backend answering from per-stage reply queues.
///
/// The last reply queued for a stage is sticky: once the queue is down to
/// one entry it is returned for every further call.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<StageKind, VecDeque<Reply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `stage`.
    pub fn reply(self, stage: StageKind, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(reply);
        self
    }

    /// Drop every reply queued for `stage`.
    pub fn reset(self, stage: StageKind) -> Self {
        self.replies.lock().unwrap().remove(&stage);
        self
    }

    /// Queue a JSON value for `stage`.
    pub fn respond(self, stage: StageKind, value: Value) -> Self {
        self.reply(stage, Reply::Value(value))
    }

    /// Backend that accepts the topic, plans `terms`, and answers every later
    /// stage with a passing, non-empty artifact.
    pub fn happy_path(terms: &[&str]) -> Self {
        let queries: Vec<Value> = terms
            .iter()
            .map(|t| json!({ "term": t, "rationale": format!("covers {t}") }))
            .collect();
        Self::new()
            .respond(
                StageKind::Guardrail,
                json!({ "accepted": true, "rationale": "A researchable public topic." }),
            )
            .respond(StageKind::Plan, json!({ "queries": queries }))
            .respond(
                StageKind::Research,
                json!({
                    "summary": "Findings in brief.",
                    "body": "## Introduction\nFindings.\n\n## Conclusion\nDone.",
                }),
            )
            .respond(
                StageKind::Evaluate,
                json!({ "passed": true, "verdict": "Well structured.", "rationale": "All sections present." }),
            )
            .respond(
                StageKind::Summarize,
                json!({ "markdown": "# Report\n\nFindings.   \n" }),
            )
    }

    /// Number of generate calls made for `stage`.
    pub fn calls(&self, stage: StageKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }

    /// Recorded requests for `stage`, oldest first.
    pub fn requests(&self, stage: StageKind) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect()
    }

    fn next_reply(&self, stage: StageKind) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(&stage)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        match self.next_reply(request.stage) {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Refuse(m)) => Err(GenerationError::Refusal(m)),
            Some(Reply::Malformed(m)) => Err(GenerationError::Malformed(m)),
            Some(Reply::Transport(m)) => Err(GenerationError::Transport(m)),
            Some(Reply::Hang) => {
                futures::future::pending::<()>().await;
                Err(GenerationError::Timeout("unreachable".to_string()))
            }
            None => Err(GenerationError::Transport(format!(
                "no scripted reply for {}",
                request.stage
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// CountingLauncher
// ---------------------------------------------------------------------------

/// A request a fake tool received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub tool_id: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Default)]
struct LaunchCounters {
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Tool launcher that hands out in-process channels and counts lifecycle
/// calls.
#[derive(Debug, Clone, Default)]
pub struct CountingLauncher {
    counters: Arc<LaunchCounters>,
    fail_kind: Option<ToolKind>,
    launch_delay: Option<Duration>,
    request_delay: Option<Duration>,
}

impl CountingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make launches of `kind` fail as if the process exited during startup.
    pub fn failing(mut self, kind: ToolKind) -> Self {
        self.fail_kind = Some(kind);
        self
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Successful launches.
    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.counters.shutdowns.load(Ordering::SeqCst)
    }

    /// Launched but not yet shut down.
    pub fn live(&self) -> usize {
        self.launches().saturating_sub(self.shutdowns())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.counters.requests.lock().unwrap().clone()
    }

    /// `tools/call` requests naming `tool`.
    pub fn tool_calls(&self, tool: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "tools/call" && r.params["name"] == tool)
            .collect()
    }
}

#[async_trait]
impl ToolLauncher for CountingLauncher {
    async fn launch(&self, spec: &ToolProcessSpec) -> ToolResult<Box<dyn ToolChannel>> {
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_kind == Some(spec.kind) {
            return Err(ToolProcessError::ProcessExitedEarly {
                id: spec.id.clone(),
                status: "exit status: 1".to_string(),
            });
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            tool_id: spec.id.clone(),
            counters: Arc::clone(&self.counters),
            request_delay: self.request_delay,
        }))
    }
}

struct FakeChannel {
    tool_id: String,
    counters: Arc<LaunchCounters>,
    request_delay: Option<Duration>,
}

#[async_trait]
impl ToolChannel for FakeChannel {
    async fn request(&mut self, method: &str, params: Value) -> ToolResult<Value> {
        self.counters.requests.lock().unwrap().push(RecordedRequest {
            tool_id: self.tool_id.clone(),
            method: method.to_string(),
            params: params.clone(),
        });
        if let Some(delay) = self.request_delay {
            tokio::time::sleep(delay).await;
        }

        let text = match params["name"].as_str() {
            Some("google_search") => format!(
                "1. result for {}",
                params["arguments"]["q"].as_str().unwrap_or_default()
            ),
            Some(name) => format!("{name} ok"),
            None => "ok".to_string(),
        };
        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }

    async fn shutdown(&mut self, _grace: Duration) -> ToolResult<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTraceSink
// ---------------------------------------------------------------------------

/// Trace sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, run_id: &str) -> Vec<TraceEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.run_id == run_id)
            .collect()
    }

    /// Count of events for `stage` with `status`, across all runs.
    pub fn count(&self, stage: StageKind, status: TraceStatus) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.stage == stage && e.status == status)
            .count()
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: TraceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stage: StageKind) -> GenerationRequest {
        GenerationRequest {
            stage,
            model: "m".into(),
            instructions: String::new(),
            prompt: String::new(),
            schema: json!({}),
            reasoning_effort: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_backend_last_reply_is_sticky() {
        let backend = ScriptedBackend::new()
            .respond(StageKind::Evaluate, json!({ "n": 1 }))
            .respond(StageKind::Evaluate, json!({ "n": 2 }));

        let req = request(StageKind::Evaluate);
        assert_eq!(backend.generate(&req).await.unwrap()["n"], 1);
        assert_eq!(backend.generate(&req).await.unwrap()["n"], 2);
        assert_eq!(backend.generate(&req).await.unwrap()["n"], 2);
        assert_eq!(backend.calls(StageKind::Evaluate), 3);
    }

    #[tokio::test]
    async fn test_scripted_backend_unscripted_stage_fails() {
        let backend = ScriptedBackend::new();
        let err = backend.generate(&request(StageKind::Plan)).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }

    #[tokio::test]
    async fn test_counting_launcher_failure_mode() {
        let launcher = CountingLauncher::new().failing(ToolKind::Filesystem);
        let spec = ToolProcessSpec::new("fs", ToolKind::Filesystem, "fake");
        assert!(launcher.launch(&spec).await.is_err());
        assert_eq!(launcher.launches(), 0);
    }
}
