//! Error taxonomy shared by stages and the pipeline.

use serde::{Deserialize, Serialize};

/// Why a single stage invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    Timeout,
    UpstreamToolUnavailable,
    /// The backend returned data that fails the stage contract. Never retried
    /// by the stage itself.
    MalformedOutput,
    ModelRefusal,
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::UpstreamToolUnavailable => "upstream_tool_unavailable",
            StageErrorKind::MalformedOutput => "malformed_output",
            StageErrorKind::ModelRefusal => "model_refusal",
        };
        write!(f, "{s}")
    }
}

/// Typed failure of a stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Timeout, message)
    }

    pub fn tool_unavailable(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::UpstreamToolUnavailable, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::MalformedOutput, message)
    }

    pub fn refusal(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::ModelRefusal, message)
    }
}

/// Result type for stage operations.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Run-level outcome classification reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Policy outcome of the guardrail, not a failure.
    AdmissionRejected,
    StageTimeout,
    ToolProcessUnavailable,
    MalformedOutput,
    ModelRefusal,
    RetryBudgetExhausted,
    Cancelled,
}

impl From<StageErrorKind> for ErrorKind {
    fn from(kind: StageErrorKind) -> Self {
        match kind {
            StageErrorKind::Timeout => ErrorKind::StageTimeout,
            StageErrorKind::UpstreamToolUnavailable => ErrorKind::ToolProcessUnavailable,
            StageErrorKind::MalformedOutput => ErrorKind::MalformedOutput,
            StageErrorKind::ModelRefusal => ErrorKind::ModelRefusal,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::AdmissionRejected => "admission_rejected",
            ErrorKind::StageTimeout => "stage_timeout",
            ErrorKind::ToolProcessUnavailable => "tool_process_unavailable",
            ErrorKind::MalformedOutput => "malformed_output",
            ErrorKind::ModelRefusal => "model_refusal",
            ErrorKind::RetryBudgetExhausted => "retry_budget_exhausted",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::malformed("search plan has no queries");
        assert_eq!(err.to_string(), "malformed_output: search plan has no queries");
    }

    #[test]
    fn test_stage_kind_maps_to_run_kind() {
        assert_eq!(ErrorKind::from(StageErrorKind::Timeout), ErrorKind::StageTimeout);
        assert_eq!(
            ErrorKind::from(StageErrorKind::UpstreamToolUnavailable),
            ErrorKind::ToolProcessUnavailable
        );
        assert_eq!(
            ErrorKind::from(StageErrorKind::MalformedOutput),
            ErrorKind::MalformedOutput
        );
        assert_eq!(
            ErrorKind::from(StageErrorKind::ModelRefusal),
            ErrorKind::ModelRefusal
        );
    }

    #[test]
    fn test_error_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RetryBudgetExhausted).unwrap();
        assert_eq!(json, "\"retry_budget_exhausted\"");
    }
}
