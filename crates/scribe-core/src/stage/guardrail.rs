//! Admission gate run before any tool process is started.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{run_stage, DynGuardrailStage, StageContext};
use crate::domain::{StageResult, Topic};

/// Gate state for one topic. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    Pending,
    Accepted { rationale: String },
    Rejected { rationale: String },
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GateState::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, GateState::Accepted { .. })
    }

    pub fn rationale(&self) -> Option<&str> {
        match self {
            GateState::Pending => None,
            GateState::Accepted { rationale } | GateState::Rejected { rationale } => {
                Some(rationale)
            }
        }
    }
}

/// Wraps the guardrail stage and decides admission.
pub struct GuardrailGate {
    stage: Arc<DynGuardrailStage>,
}

impl GuardrailGate {
    pub fn new(stage: Arc<DynGuardrailStage>) -> Self {
        Self { stage }
    }

    /// Move `topic` from `Pending` to a terminal state.
    ///
    /// Blank topics are rejected without calling the backend. The stage's
    /// rationale is returned verbatim.
    pub async fn admit(&self, topic: &Topic, cx: &StageContext<'_>) -> StageResult<GateState> {
        if topic.is_blank() {
            return Ok(GateState::Rejected {
                rationale: "The topic is empty; there is nothing to research.".to_string(),
            });
        }

        let verdict = run_stage(self.stage.as_ref(), topic, cx).await?;
        Ok(if verdict.accepted {
            GateState::Accepted {
                rationale: verdict.rationale,
            }
        } else {
            GateState::Rejected {
                rationale: verdict.rationale,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StageKind, StageErrorKind};
    use crate::fakes::{MemoryTraceSink, ScriptedBackend};
    use crate::stage::{roles, GuardrailContract, RoleStage};
    use crate::tool_process::ToolSet;
    use serde_json::json;

    fn gate(backend: Arc<ScriptedBackend>) -> GuardrailGate {
        GuardrailGate::new(Arc::new(RoleStage::new(
            GuardrailContract,
            roles::guardrail(),
            backend,
        )))
    }

    #[tokio::test]
    async fn test_blank_topic_rejected_without_backend_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let tools = ToolSet::new();
        let trace = MemoryTraceSink::new();
        let cx = StageContext {
            run_id: "r",
            tools: &tools,
            trace: &trace,
        };

        let state = gate(backend.clone()).admit(&Topic::new("   "), &cx).await.unwrap();
        assert!(!state.is_accepted());
        assert!(state.is_terminal());
        assert!(!state.rationale().unwrap().is_empty());
        assert_eq!(backend.calls(StageKind::Guardrail), 0);
    }

    #[tokio::test]
    async fn test_rationale_surfaces_verbatim() {
        let backend = Arc::new(ScriptedBackend::new().respond(
            StageKind::Guardrail,
            json!({ "accepted": false, "rationale": "Personal questions cannot be researched." }),
        ));
        let tools = ToolSet::new();
        let trace = MemoryTraceSink::new();
        let cx = StageContext {
            run_id: "r",
            tools: &tools,
            trace: &trace,
        };

        let state = gate(backend).admit(&Topic::new("What is my name?"), &cx).await.unwrap();
        assert_eq!(
            state,
            GateState::Rejected {
                rationale: "Personal questions cannot be researched.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_rationale_is_malformed() {
        let backend = Arc::new(ScriptedBackend::new().respond(
            StageKind::Guardrail,
            json!({ "accepted": true, "rationale": "" }),
        ));
        let tools = ToolSet::new();
        let trace = MemoryTraceSink::new();
        let cx = StageContext {
            run_id: "r",
            tools: &tools,
            trace: &trace,
        };

        let err = gate(backend).admit(&Topic::new("rust async"), &cx).await.unwrap_err();
        assert_eq!(err.kind, StageErrorKind::MalformedOutput);
    }
}
