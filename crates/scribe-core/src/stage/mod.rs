//! Stages: typed units of work that the pipeline sequences.
//!
//! Every role (guardrail, plan, research, evaluate, summarize) is a
//! [`RoleStage`] parameterised by a [`RoleContract`]. The pipeline only sees
//! the [`Stage`] trait, so tests can also plug in hand-written stages.

pub mod contracts;
pub mod guardrail;
pub mod role;
pub mod roles;

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{
    Critique, GuardrailVerdict, ResearchReport, ResearchRequest, SearchPlan, StageError,
    StageKind, StageResult, SummarizeRequest, Summary, Topic,
};
use crate::obs;
use crate::tool_process::ToolSet;
use crate::trace::{TraceEvent, TraceSink, TraceStatus};

pub use contracts::{
    EvaluateContract, GuardrailContract, PlanContract, ResearchContract, SummarizeContract,
};
pub use guardrail::{GateState, GuardrailGate};
pub use role::{RoleContract, RoleSpec, RoleStage};

/// Per-run context handed to every stage invocation.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub run_id: &'a str,
    pub tools: &'a ToolSet,
    pub trace: &'a dyn TraceSink,
}

/// A unit of work with a typed input and output.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + Sync;
    type Output: Serialize + Send;

    fn kind(&self) -> StageKind;

    /// Cheap structural check run before `execute`.
    fn validate(&self, input: &Self::Input) -> StageResult<()>;

    async fn execute(
        &self,
        input: &Self::Input,
        cx: &StageContext<'_>,
    ) -> StageResult<Self::Output>;
}

pub type DynGuardrailStage = dyn Stage<Input = Topic, Output = GuardrailVerdict>;
pub type DynPlanStage = dyn Stage<Input = Topic, Output = SearchPlan>;
pub type DynResearchStage = dyn Stage<Input = ResearchRequest, Output = ResearchReport>;
pub type DynEvaluateStage = dyn Stage<Input = ResearchReport, Output = Critique>;
pub type DynSummarizeStage = dyn Stage<Input = SummarizeRequest, Output = Summary>;

/// Validate and execute `stage`, recording trace events around the call.
pub async fn run_stage<S>(
    stage: &S,
    input: &S::Input,
    cx: &StageContext<'_>,
) -> StageResult<S::Output>
where
    S: Stage + ?Sized,
{
    let kind = stage.kind();
    obs::emit_stage_started(cx.run_id, kind);
    cx.trace
        .record(TraceEvent::new(cx.run_id, kind, TraceStatus::Started, 0, ""));

    let mut open = OpenStage {
        cx,
        kind,
        started: Instant::now(),
        closed: false,
    };
    let result = match stage.validate(input) {
        Ok(()) => stage.execute(input, cx).await,
        Err(e) => Err(e),
    };
    open.closed = true;
    let duration_ms = open.started.elapsed().as_millis() as u64;

    match &result {
        Ok(output) => {
            let summary = serde_json::to_string(output).unwrap_or_default();
            cx.trace.record(TraceEvent::new(
                cx.run_id,
                kind,
                TraceStatus::Finished,
                duration_ms,
                summary,
            ));
        }
        Err(err) => {
            cx.trace.record(TraceEvent::new(
                cx.run_id,
                kind,
                TraceStatus::Failed,
                duration_ms,
                err.to_string(),
            ));
        }
    }
    obs::emit_stage_finished(cx.run_id, kind, duration_ms, result.is_ok());
    result
}

/// A stage with a `Started` event and no outcome yet. Dropping it before
/// `closed` is set (the run was cancelled mid-stage) records `Failed`.
struct OpenStage<'a, 'b> {
    cx: &'a StageContext<'b>,
    kind: StageKind,
    started: Instant,
    closed: bool,
}

impl Drop for OpenStage<'_, '_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.cx.trace.record(TraceEvent::new(
            self.cx.run_id,
            self.kind,
            TraceStatus::Failed,
            duration_ms,
            "cancelled",
        ));
        obs::emit_stage_finished(self.cx.run_id, self.kind, duration_ms, false);
    }
}

/// Turn a violated invariant into `MalformedOutput` for `kind`.
pub(crate) fn malformed(kind: StageKind, reason: impl std::fmt::Display) -> StageError {
    StageError::malformed(format!("{kind}: {reason}"))
}
