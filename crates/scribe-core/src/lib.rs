//! Scribe Core Library
//!
//! Staged research-report orchestration: a guardrail gate, planner,
//! researcher, optional evaluator and summarizer chained over a pluggable
//! generation backend, with owned lifecycles for the tool processes the
//! stages call.

pub mod config;
pub mod domain;
pub mod fakes;
pub mod generation;
pub mod obs;
pub mod pipeline;
pub mod stage;
pub mod telemetry;
pub mod tool_process;
pub mod trace;

/// Crate version, reported to tool processes during the handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{ConfigError, PipelineConfig, ScribeConfig};

pub use domain::{
    Critique, ErrorKind, GuardrailVerdict, ResearchReport, ResearchRequest, SearchItem,
    SearchPlan, StageError, StageErrorKind, StageKind, StageResult, SummarizeRequest, Summary,
    Topic,
};

pub use generation::{
    ChatCompletionsBackend, ChatCompletionsConfig, GenerationBackend, GenerationError,
    GenerationRequest,
};

pub use pipeline::{
    CancelToken, Pipeline, PipelineBuilder, PipelineError, RunFailure, RunOutcome, RunPhase,
    RunStatus,
};

pub use stage::{run_stage, GateState, GuardrailGate, RoleContract, RoleSpec, RoleStage, Stage, StageContext};

pub use tool_process::{
    StdioLauncher, ToolChannel, ToolKind, ToolLauncher, ToolProcessError, ToolProcessHandle,
    ToolProcessSpec, ToolSet, ToolStatus, ToolSummary,
};

pub use trace::{TraceEvent, TraceSink, TraceStatus, TracingSink};
