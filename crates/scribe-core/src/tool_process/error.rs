//! Error types for the tool-process layer.

use crate::domain::StageError;

/// Errors produced while starting, using, or stopping a tool process.
#[derive(Debug, thiserror::Error)]
pub enum ToolProcessError {
    #[error("tool {id} failed to spawn: {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tool {id} not ready within {timeout_ms}ms")]
    StartupTimeout { id: String, timeout_ms: u64 },

    #[error("tool {id} exited before becoming ready ({status})")]
    ProcessExitedEarly { id: String, status: String },

    #[error("tool {id} is not ready (status {status})")]
    NotReady { id: String, status: String },

    #[error("tool {id} request {method} timed out after {timeout_ms}ms")]
    RequestTimeout {
        id: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("tool {id} returned error {code}: {message}")]
    Remote {
        id: String,
        code: i64,
        message: String,
    },

    #[error("tool {id} reported failure from {tool}: {message}")]
    ToolReported {
        id: String,
        tool: String,
        message: String,
    },

    #[error("tool {id} protocol error: {message}")]
    Protocol { id: String, message: String },

    #[error("no {kind} tool is available to this run")]
    Missing { kind: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tool-process operations.
pub type ToolResult<T> = std::result::Result<T, ToolProcessError>;

impl From<ToolProcessError> for StageError {
    fn from(err: ToolProcessError) -> Self {
        match err {
            ToolProcessError::RequestTimeout { .. } | ToolProcessError::StartupTimeout { .. } => {
                StageError::timeout(err.to_string())
            }
            other => StageError::tool_unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageErrorKind;

    #[test]
    fn test_request_timeout_maps_to_stage_timeout() {
        let err = ToolProcessError::RequestTimeout {
            id: "serper-search".into(),
            method: "tools/call".into(),
            timeout_ms: 30_000,
        };
        let stage: StageError = err.into();
        assert_eq!(stage.kind, StageErrorKind::Timeout);
        assert!(stage.message.contains("tools/call"));
    }

    #[test]
    fn test_remote_error_maps_to_tool_unavailable() {
        let err = ToolProcessError::Remote {
            id: "filesystem".into(),
            code: -32602,
            message: "path outside allowed roots".into(),
        };
        let stage: StageError = err.into();
        assert_eq!(stage.kind, StageErrorKind::UpstreamToolUnavailable);
    }
}
