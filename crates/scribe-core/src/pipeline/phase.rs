//! Run phases and their allowed transitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Gating,
    Planning,
    Researching,
    Evaluating,
    Summarizing,
    Rejected,
    Failed,
    Completed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Rejected | RunPhase::Failed | RunPhase::Completed
        )
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// Any non-terminal phase may fail. `Evaluating -> Researching` is the
    /// feedback back-edge.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Gating, Planning)
                | (Gating, Rejected)
                | (Planning, Researching)
                | (Researching, Evaluating)
                | (Researching, Summarizing)
                | (Evaluating, Researching)
                | (Evaluating, Summarizing)
                | (Summarizing, Completed)
        )
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Gating => "gating",
            RunPhase::Planning => "planning",
            RunPhase::Researching => "researching",
            RunPhase::Evaluating => "evaluating",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Rejected => "rejected",
            RunPhase::Failed => "failed",
            RunPhase::Completed => "completed",
        };
        write!(f, "{s}")
    }
}
