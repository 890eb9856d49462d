//! The run driver: gate, acquire tools, plan, research with feedback,
//! summarize, release.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::cancel::CancelToken;
use super::context::RunContext;
use super::error::{PipelineError, PipelineResult};
use super::outcome::{artifact_digest, RunFailure, RunOutcome, RunStatus};
use super::phase::RunPhase;
use crate::config::PipelineConfig;
use crate::domain::{ResearchRequest, StageKind, SummarizeRequest, Topic};
use crate::generation::GenerationBackend;
use crate::obs;
use crate::stage::{
    run_stage, DynEvaluateStage, DynPlanStage, DynResearchStage, DynSummarizeStage,
    EvaluateContract, GuardrailContract, GuardrailGate, PlanContract, ResearchContract,
    RoleStage, Stage, StageContext, SummarizeContract,
};
use crate::tool_process::{
    StdioLauncher, ToolLauncher, ToolProcessHandle, ToolProcessSpec, ToolSet,
};
use crate::trace::{TraceSink, TracingSink};

/// How far a run goes after admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Gate,
    Plan,
    Full,
}

/// Orchestrates runs. Shared across concurrent runs; each run owns its own
/// [`RunContext`] and tool processes.
pub struct Pipeline {
    gate: GuardrailGate,
    planner: Arc<DynPlanStage>,
    researcher: Arc<DynResearchStage>,
    evaluator: Option<Arc<DynEvaluateStage>>,
    summarizer: Arc<DynSummarizeStage>,
    launcher: Arc<dyn ToolLauncher>,
    tools: Vec<ToolProcessSpec>,
    trace: Arc<dyn TraceSink>,
    max_retries: u32,
}

impl Pipeline {
    pub fn builder(backend: Arc<dyn GenerationBackend>) -> PipelineBuilder {
        PipelineBuilder::new(backend)
    }

    /// Pipeline with every role backed by `backend`, tools launched as
    /// local stdio processes, and trace events sent to `tracing`.
    pub fn from_config(config: PipelineConfig, backend: Arc<dyn GenerationBackend>) -> Self {
        PipelineBuilder::new(backend).config(config).build()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run the full pipeline for `topic`.
    pub async fn run(&self, topic: impl Into<Topic>) -> RunOutcome {
        self.run_with_cancel(topic, &CancelToken::new()).await
    }

    /// Run the full pipeline, stopping early once `cancel` fires.
    pub async fn run_with_cancel(&self, topic: impl Into<Topic>, cancel: &CancelToken) -> RunOutcome {
        self.execute(topic.into(), Depth::Full, cancel).await
    }

    /// Admission check only. Never starts a tool process.
    pub async fn check(&self, topic: impl Into<Topic>) -> RunOutcome {
        self.execute(topic.into(), Depth::Gate, &CancelToken::new())
            .await
    }

    /// Admission check followed by planning. Never starts a tool process.
    pub async fn plan(&self, topic: impl Into<Topic>) -> RunOutcome {
        self.execute(topic.into(), Depth::Plan, &CancelToken::new())
            .await
    }

    async fn execute(&self, topic: Topic, depth: Depth, cancel: &CancelToken) -> RunOutcome {
        let mut run = RunContext::new(topic);
        let run_id = run.run_id.to_string();
        let span = obs::run_span(&run_id);

        async {
            let started = Instant::now();
            obs::emit_run_started(&run_id, run.topic.as_str());

            let result = self.drive(&mut run, &run_id, depth, cancel).await;
            let tools = run.tools.release_all().await;

            let (status, failure) = match result {
                Ok(()) => (status_of(run.phase()), None),
                Err(err) => {
                    run.advance(RunPhase::Failed);
                    let failure = RunFailure {
                        kind: err.kind(),
                        message: err.to_string(),
                        last_completed_stage: run.last_completed(),
                    };
                    (RunStatus::Failed, Some(failure))
                }
            };

            obs::emit_run_finished(
                &run_id,
                status.as_str(),
                started.elapsed().as_millis() as u64,
                failure.as_ref().map(|f| f.kind),
            );

            let artifact = match status {
                RunStatus::Completed => run.artifact.take(),
                _ => None,
            };
            RunOutcome {
                run_id: run.run_id,
                status,
                artifact_digest: artifact.as_deref().map(artifact_digest),
                artifact,
                rationale: run.rationale.take(),
                plan: run.plan.take(),
                failure,
                research_attempts: run.research_attempts,
                phases: run.phases().to_vec(),
                tools,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        run: &mut RunContext,
        run_id: &str,
        depth: Depth,
        cancel: &CancelToken,
    ) -> PipelineResult<()> {
        let state = guarded(cancel, async {
            let cx = self.stage_cx(run_id, &run.tools);
            self.gate
                .admit(&run.topic, &cx)
                .await
                .map_err(PipelineError::stage(StageKind::Guardrail))
        })
        .await?;
        run.complete_stage(StageKind::Guardrail);
        run.rationale = state.rationale().map(str::to_string);
        if !state.is_accepted() {
            run.advance(RunPhase::Rejected);
            return Ok(());
        }
        if depth == Depth::Gate {
            return Ok(());
        }

        if depth == Depth::Full {
            self.acquire_tools(run, cancel).await?;
        }

        run.advance(RunPhase::Planning);
        let plan = self
            .call(cancel, run_id, &run.tools, self.planner.as_ref(), &run.topic)
            .await?;
        run.complete_stage(StageKind::Plan);
        run.plan = Some(plan.clone());
        if depth == Depth::Plan {
            return Ok(());
        }

        run.advance(RunPhase::Researching);
        let mut retries = 0;
        loop {
            let request = ResearchRequest {
                topic: run.topic.clone(),
                plan: plan.clone(),
                critique: run.latest_critique().cloned(),
            };
            run.research_attempts += 1;
            let report = self
                .call(cancel, run_id, &run.tools, self.researcher.as_ref(), &request)
                .await?;
            run.complete_stage(StageKind::Research);

            let Some(evaluator) = &self.evaluator else {
                run.reports.push(report);
                break;
            };

            run.advance(RunPhase::Evaluating);
            let critique = self
                .call(cancel, run_id, &run.tools, evaluator.as_ref(), &report)
                .await?;
            run.complete_stage(StageKind::Evaluate);
            run.reports.push(report);

            let passed = critique.passed;
            let verdict = critique.verdict.clone();
            run.critiques.push(critique);
            if passed {
                break;
            }
            if retries >= self.max_retries {
                return Err(PipelineError::RetryBudgetExhausted {
                    attempts: run.research_attempts,
                    verdict,
                });
            }
            retries += 1;
            obs::emit_feedback_retry(run_id, retries, self.max_retries, &verdict);
            run.advance(RunPhase::Researching);
        }

        run.advance(RunPhase::Summarizing);
        let request = SummarizeRequest {
            topic: run.topic.clone(),
            reports: run.reports.clone(),
        };
        let summary = self
            .call(cancel, run_id, &run.tools, self.summarizer.as_ref(), &request)
            .await?;
        run.complete_stage(StageKind::Summarize);
        run.artifact = Some(summary.normalized());
        run.advance(RunPhase::Completed);
        Ok(())
    }

    /// Acquire every configured tool in order. Handles acquired before a
    /// failure stay in the run's tool set and are released with it.
    async fn acquire_tools(&self, run: &mut RunContext, cancel: &CancelToken) -> PipelineResult<()> {
        for spec in &self.tools {
            let handle = guarded(cancel, async {
                ToolProcessHandle::acquire(self.launcher.as_ref(), spec.clone())
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
            run.tools.insert(handle);
        }
        Ok(())
    }

    async fn call<S>(
        &self,
        cancel: &CancelToken,
        run_id: &str,
        tools: &ToolSet,
        stage: &S,
        input: &S::Input,
    ) -> PipelineResult<S::Output>
    where
        S: Stage + ?Sized,
    {
        let kind = stage.kind();
        let cx = self.stage_cx(run_id, tools);
        guarded(cancel, async {
            run_stage(stage, input, &cx)
                .await
                .map_err(PipelineError::stage(kind))
        })
        .await
    }

    fn stage_cx<'a>(&'a self, run_id: &'a str, tools: &'a ToolSet) -> StageContext<'a> {
        StageContext {
            run_id,
            tools,
            trace: self.trace.as_ref(),
        }
    }
}

/// Run `work` unless `cancel` has fired or fires first.
async fn guarded<T, F>(cancel: &CancelToken, work: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = work => result,
    }
}

fn status_of(phase: RunPhase) -> RunStatus {
    match phase {
        RunPhase::Rejected => RunStatus::Rejected,
        RunPhase::Completed => RunStatus::Completed,
        RunPhase::Failed => RunStatus::Failed,
        _ => RunStatus::Accepted,
    }
}

/// Assembles a [`Pipeline`].
///
/// Every role defaults to a [`RoleStage`] over the shared backend with the
/// settings in [`PipelineConfig`]; individual stages can be replaced.
pub struct PipelineBuilder {
    backend: Arc<dyn GenerationBackend>,
    config: PipelineConfig,
    launcher: Option<Arc<dyn ToolLauncher>>,
    trace: Option<Arc<dyn TraceSink>>,
    researcher: Option<Arc<DynResearchStage>>,
    summarizer: Option<Arc<DynSummarizeStage>>,
}

impl PipelineBuilder {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            config: PipelineConfig::default(),
            launcher: None,
            trace: None,
            researcher: None,
            summarizer: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ToolLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn tool(mut self, spec: ToolProcessSpec) -> Self {
        self.config.tools.push(spec);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn evaluate(mut self, evaluate: bool) -> Self {
        self.config.evaluate = evaluate;
        self
    }

    pub fn researcher(mut self, stage: Arc<DynResearchStage>) -> Self {
        self.researcher = Some(stage);
        self
    }

    pub fn summarizer(mut self, stage: Arc<DynSummarizeStage>) -> Self {
        self.summarizer = Some(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        let config = self.config;
        let backend = self.backend;

        let gate = GuardrailGate::new(Arc::new(RoleStage::new(
            GuardrailContract,
            config.role(StageKind::Guardrail),
            backend.clone(),
        )));
        let planner: Arc<DynPlanStage> = Arc::new(RoleStage::new(
            PlanContract,
            config.role(StageKind::Plan),
            backend.clone(),
        ));
        let researcher = self.researcher.unwrap_or_else(|| {
            Arc::new(RoleStage::new(
                ResearchContract::new(config.max_searches),
                config.role(StageKind::Research),
                backend.clone(),
            ))
        });
        let evaluator: Option<Arc<DynEvaluateStage>> = if config.evaluate {
            Some(Arc::new(RoleStage::new(
                EvaluateContract,
                config.role(StageKind::Evaluate),
                backend.clone(),
            )))
        } else {
            None
        };
        let summarizer = self.summarizer.unwrap_or_else(|| {
            Arc::new(RoleStage::new(
                SummarizeContract::new(config.report_dir.clone()),
                config.role(StageKind::Summarize),
                backend.clone(),
            ))
        });

        Pipeline {
            gate,
            planner,
            researcher,
            evaluator,
            summarizer,
            launcher: self
                .launcher
                .unwrap_or_else(|| Arc::new(StdioLauncher::new())),
            tools: config.tools,
            trace: self.trace.unwrap_or_else(|| Arc::new(TracingSink)),
            max_retries: config.max_retries,
        }
    }
}
