//! Text-generation backends.
//!
//! Stages describe what they want as a [`GenerationRequest`] and receive a
//! JSON value shaped by the request's schema. The backend is a trait object
//! so tests can substitute [`crate::fakes::ScriptedBackend`].

pub mod chat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{StageError, StageKind};

pub use chat::{ChatCompletionsBackend, ChatCompletionsConfig};

/// One structured-output generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub stage: StageKind,
    pub model: String,
    /// System instructions for the role.
    pub instructions: String,
    /// Rendered user prompt.
    pub prompt: String,
    /// JSON schema the output must satisfy.
    pub schema: Value,
    pub reasoning_effort: Option<String>,
}

/// Errors a generation backend can report.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("model refused: {0}")]
    Refusal(String),

    #[error("malformed model output: {0}")]
    Malformed(String),

    #[error("generation timed out: {0}")]
    Timeout(String),

    #[error("generation transport failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout(err.to_string())
        } else if err.is_decode() {
            GenerationError::Malformed(err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

impl From<GenerationError> for StageError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Refusal(m) => StageError::refusal(m),
            GenerationError::Malformed(m) => StageError::malformed(m),
            GenerationError::Timeout(m) => StageError::timeout(m),
            GenerationError::Transport(m) => StageError::tool_unavailable(m),
        }
    }
}

/// Produces structured JSON output for a stage.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError>;
}
