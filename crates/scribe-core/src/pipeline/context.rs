//! Per-run state.

use tracing::warn;
use uuid::Uuid;

use super::phase::RunPhase;
use crate::domain::{Critique, ResearchReport, SearchPlan, StageKind, Topic};
use crate::tool_process::ToolSet;

/// Everything one run owns. Created at run start, dropped at run end after
/// its tools have been released.
pub struct RunContext {
    pub run_id: Uuid,
    pub topic: Topic,
    /// Gate rationale once admission has been decided.
    pub rationale: Option<String>,
    pub plan: Option<SearchPlan>,
    /// Every valid research report, oldest first.
    pub reports: Vec<ResearchReport>,
    pub critiques: Vec<Critique>,
    pub tools: ToolSet,
    /// Number of research stage invocations, including failed ones.
    pub research_attempts: u32,
    /// Normalized summary markdown; set only when summarize succeeded.
    pub artifact: Option<String>,
    phases: Vec<RunPhase>,
    last_completed: Option<StageKind>,
}

impl RunContext {
    pub fn new(topic: Topic) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            topic,
            rationale: None,
            plan: None,
            reports: Vec::new(),
            critiques: Vec::new(),
            tools: ToolSet::new(),
            research_attempts: 0,
            artifact: None,
            phases: vec![RunPhase::Gating],
            last_completed: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Gating)
    }

    pub fn phases(&self) -> &[RunPhase] {
        &self.phases
    }

    /// Move to `next`. Invalid transitions are logged and still recorded so
    /// the history shows what happened.
    pub fn advance(&mut self, next: RunPhase) {
        let current = self.phase();
        if !current.can_transition_to(next) {
            warn!(run_id = %self.run_id, from = %current, to = %next, "unexpected phase transition");
            debug_assert!(false, "invalid phase transition {current} -> {next}");
        }
        self.phases.push(next);
    }

    pub fn complete_stage(&mut self, stage: StageKind) {
        self.last_completed = Some(stage);
    }

    pub fn last_completed(&self) -> Option<StageKind> {
        self.last_completed
    }

    /// Most recent critique, fed into a research retry.
    pub fn latest_critique(&self) -> Option<&Critique> {
        self.critiques.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_starts_gating() {
        let cx = RunContext::new(Topic::new("rust"));
        assert_eq!(cx.phase(), RunPhase::Gating);
        assert!(cx.tools.is_empty());
        assert_eq!(cx.last_completed(), None);
    }

    #[test]
    fn test_advance_records_history() {
        let mut cx = RunContext::new(Topic::new("rust"));
        cx.advance(RunPhase::Planning);
        cx.complete_stage(StageKind::Guardrail);
        cx.advance(RunPhase::Failed);
        assert_eq!(
            cx.phases(),
            &[RunPhase::Gating, RunPhase::Planning, RunPhase::Failed]
        );
        assert_eq!(cx.last_completed(), Some(StageKind::Guardrail));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = RunContext::new(Topic::new("x"));
        let b = RunContext::new(Topic::new("x"));
        assert_ne!(a.run_id, b.run_id);
    }
}
