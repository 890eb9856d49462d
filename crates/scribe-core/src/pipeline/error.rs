//! Error type for a pipeline run.

use crate::domain::{ErrorKind, StageError, StageKind};
use crate::tool_process::ToolProcessError;

/// Why a run failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },

    #[error("tool process unavailable: {0}")]
    Tool(#[from] ToolProcessError),

    #[error("research rejected by evaluator after {attempts} attempts: {verdict}")]
    RetryBudgetExhausted { attempts: u32, verdict: String },

    #[error("run cancelled")]
    Cancelled,
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn stage(stage: StageKind) -> impl FnOnce(StageError) -> Self {
        move |source| PipelineError::Stage { stage, source }
    }

    /// Run-level classification reported to the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Stage { source, .. } => source.kind.into(),
            PipelineError::Tool(_) => ErrorKind::ToolProcessUnavailable,
            PipelineError::RetryBudgetExhausted { .. } => ErrorKind::RetryBudgetExhausted,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
