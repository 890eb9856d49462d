//! Default role settings: model, reasoning effort and instructions per role.

use std::time::Duration;

use super::role::RoleSpec;
use crate::domain::StageKind;
use crate::tool_process::ToolKind;

const GUARDRAIL_INSTRUCTIONS: &str = "\
You screen research topics before any work is done. Accept a topic when it \
asks for information that can be researched on the public web. Reject \
topics about the requester themselves, requests for private data, and \
anything that is not a research question. Always explain the decision in \
one or two sentences.";

const PLAN_INSTRUCTIONS: &str = "\
You are a research assistant. Given a query, produce a short list of web \
search terms that together best answer it, each with the reason it helps.";

const RESEARCH_INSTRUCTIONS: &str = "\
You are a senior researcher writing a cohesive report for a research query. \
Use the provided search results. Return a two or three sentence summary of \
the findings and the full report in markdown with an introduction, \
findings and a conclusion.";

const EVALUATE_INSTRUCTIONS: &str = "\
You are an expert reviewer of markdown research reports. Check that the \
report has a clear introduction, methodology, findings and conclusion, \
that sections follow logically, and that no statement is ambiguous. Say \
whether it passes, give a two or three sentence verdict, and explain why.";

const SUMMARIZE_INSTRUCTIONS: &str = "\
You summarize research reports into a single well-structured markdown \
document with the given title as its heading. Return only the markdown.";

pub fn guardrail() -> RoleSpec {
    RoleSpec::new(StageKind::Guardrail, "gpt-4o-mini", GUARDRAIL_INSTRUCTIONS)
        .with_timeout(Duration::from_secs(30))
}

pub fn plan() -> RoleSpec {
    RoleSpec::new(StageKind::Plan, "gpt-5-mini", PLAN_INSTRUCTIONS).with_reasoning_effort("high")
}

pub fn research() -> RoleSpec {
    RoleSpec::new(StageKind::Research, "gpt-5-nano", RESEARCH_INSTRUCTIONS)
        .with_required_tool(ToolKind::Search)
}

pub fn evaluate() -> RoleSpec {
    RoleSpec::new(StageKind::Evaluate, "gpt-4o-mini", EVALUATE_INSTRUCTIONS)
}

pub fn summarize() -> RoleSpec {
    RoleSpec::new(StageKind::Summarize, "gpt-5-nano", SUMMARIZE_INSTRUCTIONS)
        .with_reasoning_effort("minimal")
}

/// Default settings for `kind`.
pub fn default_spec(kind: StageKind) -> RoleSpec {
    match kind {
        StageKind::Guardrail => guardrail(),
        StageKind::Plan => plan(),
        StageKind::Research => research(),
        StageKind::Evaluate => evaluate(),
        StageKind::Summarize => summarize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_specs_match_their_kind() {
        for kind in [
            StageKind::Guardrail,
            StageKind::Plan,
            StageKind::Research,
            StageKind::Evaluate,
            StageKind::Summarize,
        ] {
            let spec = default_spec(kind);
            assert_eq!(spec.kind, kind);
            assert!(!spec.instructions.is_empty());
        }
    }

    #[test]
    fn test_research_requires_search_tool() {
        assert_eq!(research().required_tools, vec![ToolKind::Search]);
        assert!(summarize().required_tools.is_empty());
        assert_eq!(plan().reasoning_effort.as_deref(), Some("high"));
    }
}
