//! What a run reports back to its caller.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::phase::RunPhase;
use crate::domain::{ErrorKind, SearchPlan, StageKind};
use crate::tool_process::ToolSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Admitted by the gate; returned by gate-only and plan-only runs.
    Accepted,
    Rejected,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Accepted => "accepted",
            RunStatus::Rejected => "rejected",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub last_completed_stage: Option<StageKind>,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Final markdown. Present only when summarize succeeded.
    pub artifact: Option<String>,
    /// Hex SHA-256 of `artifact`.
    pub artifact_digest: Option<String>,
    /// Gate rationale, verbatim.
    pub rationale: Option<String>,
    pub plan: Option<SearchPlan>,
    pub failure: Option<RunFailure>,
    pub research_attempts: u32,
    pub phases: Vec<RunPhase>,
    pub tools: Vec<ToolSummary>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.status {
            RunStatus::Rejected => Some(ErrorKind::AdmissionRejected),
            _ => self.failure.as_ref().map(|f| f.kind),
        }
    }
}

/// Hex-encoded SHA-256 of `artifact`.
pub fn artifact_digest(artifact: &str) -> String {
    hex::encode(Sha256::digest(artifact.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_digest_is_stable() {
        assert_eq!(
            artifact_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(artifact_digest("# Report\n"), artifact_digest("# Report\n"));
        assert_ne!(artifact_digest("# Report\n"), artifact_digest("# Report"));
    }

    #[test]
    fn test_rejected_outcome_reports_admission_kind() {
        let outcome = RunOutcome {
            run_id: Uuid::new_v4(),
            status: RunStatus::Rejected,
            artifact: None,
            artifact_digest: None,
            rationale: Some("personal question".into()),
            plan: None,
            failure: None,
            research_attempts: 0,
            phases: vec![RunPhase::Gating, RunPhase::Rejected],
            tools: vec![],
        };
        assert_eq!(outcome.error_kind(), Some(ErrorKind::AdmissionRejected));
        assert!(!outcome.is_completed());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
    }
}
