//! Stage contracts: the typed artifacts handed from one stage to the next.
//!
//! Every type here is a plain serde value. Invariants that the generation
//! backend can violate are checked by [`SearchPlan::check`],
//! [`ResearchReport::check`] and friends, which return the violated rule as
//! a string so the calling stage can surface it as `MalformedOutput`.

use serde::{Deserialize, Serialize};

/// The stages a run can pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Guardrail,
    Plan,
    Research,
    Evaluate,
    Summarize,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Guardrail => "guardrail",
            StageKind::Plan => "plan",
            StageKind::Research => "research",
            StageKind::Evaluate => "evaluate",
            StageKind::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw user request. Created once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Filesystem-safe name derived from the topic, used for the report file.
    ///
    /// Keeps letters and digits of any script (lowercased), collapses every
    /// other run of characters into a single `-`, and caps the result at
    /// [`SLUG_MAX_BYTES`] without splitting a character.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.0.len().min(SLUG_MAX_BYTES));
        for c in self.0.chars() {
            if c.is_alphanumeric() {
                let lower: String = c.to_lowercase().collect();
                if slug.len() + lower.len() > SLUG_MAX_BYTES {
                    break;
                }
                slug.push_str(&lower);
            } else if !slug.is_empty() && !slug.ends_with('-') {
                if slug.len() + 1 > SLUG_MAX_BYTES {
                    break;
                }
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        if slug.is_empty() {
            "report".to_string()
        } else {
            slug.to_string()
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Upper bound on [`Topic::slug`], well inside common file-name limits.
pub const SLUG_MAX_BYTES: usize = 96;

/// Admission decision produced by the guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub accepted: bool,
    pub rationale: String,
}

impl GuardrailVerdict {
    pub fn check(&self) -> Result<(), String> {
        if self.rationale.trim().is_empty() {
            return Err("guardrail verdict has an empty rationale".to_string());
        }
        Ok(())
    }
}

/// One planned web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    /// The search term to use.
    pub term: String,
    /// Why this search helps answer the topic.
    pub rationale: String,
}

/// Ordered list of searches produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub queries: Vec<SearchItem>,
}

impl SearchPlan {
    /// A plan must be non-empty and every term must be non-empty.
    pub fn check(&self) -> Result<(), String> {
        if self.queries.is_empty() {
            return Err("search plan has no queries".to_string());
        }
        if let Some(pos) = self.queries.iter().position(|q| q.term.trim().is_empty()) {
            return Err(format!("search plan query #{pos} has an empty term"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Output of the research stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    /// Two or three sentence summary of the findings.
    pub summary: String,
    /// The full report in markdown.
    pub body: String,
}

impl ResearchReport {
    /// An empty body is never a valid artifact.
    pub fn check(&self) -> Result<(), String> {
        if self.body.trim().is_empty() {
            return Err("research report body is empty".to_string());
        }
        Ok(())
    }
}

/// Evaluation of a research report, fed back into research on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub passed: bool,
    pub verdict: String,
    pub rationale: String,
}

/// Input to the research stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchRequest {
    pub topic: Topic,
    pub plan: SearchPlan,
    /// Critique of the previous attempt when this is a retry.
    pub critique: Option<Critique>,
}

/// Input to the summarize stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizeRequest {
    pub topic: Topic,
    /// Every accepted report of the run, oldest first.
    pub reports: Vec<ResearchReport>,
}

/// Output of the summarize stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub markdown: String,
}

impl Summary {
    pub fn check(&self) -> Result<(), String> {
        if self.markdown.trim().is_empty() {
            return Err("summary markdown is empty".to_string());
        }
        Ok(())
    }

    /// Canonical form: trailing whitespace stripped from every line and a
    /// single trailing newline.
    pub fn normalized(&self) -> String {
        let mut out = self
            .markdown
            .trim()
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(term: &str) -> SearchItem {
        SearchItem {
            term: term.to_string(),
            rationale: "because".to_string(),
        }
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let plan = SearchPlan { queries: vec![] };
        assert!(plan.check().unwrap_err().contains("no queries"));
    }

    #[test]
    fn test_plan_with_blank_term_is_rejected() {
        let plan = SearchPlan {
            queries: vec![item("agentic ai"), item("   ")],
        };
        let err = plan.check().unwrap_err();
        assert!(err.contains("#1"), "got {err}");
    }

    #[test]
    fn test_valid_plan_passes() {
        let plan = SearchPlan {
            queries: vec![item("agentic ai"), item("frontier models 2025")],
        };
        assert!(plan.check().is_ok());
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_report_with_blank_body_is_rejected() {
        let report = ResearchReport {
            summary: "short".to_string(),
            body: "\n\t ".to_string(),
        };
        assert!(report.check().is_err());
    }

    #[test]
    fn test_guardrail_verdict_requires_rationale() {
        let verdict = GuardrailVerdict {
            accepted: false,
            rationale: String::new(),
        };
        assert!(verdict.check().is_err());
    }

    #[test]
    fn test_topic_slug() {
        assert_eq!(
            Topic::new("Best agentic AI model in 2025?").slug(),
            "best-agentic-ai-model-in-2025"
        );
        assert_eq!(Topic::new("  ***  ").slug(), "report");
        assert_eq!(Topic::new("a".repeat(200)).slug().len(), SLUG_MAX_BYTES);
    }

    #[test]
    fn test_topic_slug_keeps_non_ascii_letters() {
        assert_eq!(
            Topic::new("2025년 최고의 에이전트 AI 모델은?").slug(),
            "2025년-최고의-에이전트-ai-모델은"
        );
        assert_eq!(Topic::new("Über Café-Kultur").slug(), "über-café-kultur");
        assert_ne!(
            Topic::new("에이전트 AI").slug(),
            Topic::new("양자 컴퓨팅").slug(),
            "distinct topics must not share a report file"
        );

        let long = Topic::new("가".repeat(100)).slug();
        assert!(long.len() <= SLUG_MAX_BYTES);
        assert!(long.chars().all(|c| c == '가'));
    }

    #[test]
    fn test_summary_normalized_is_stable() {
        let summary = Summary {
            markdown: "\n# Title   \n\nbody  \n\n".to_string(),
        };
        assert_eq!(summary.normalized(), "# Title\n\nbody\n");
        let again = Summary {
            markdown: summary.normalized(),
        };
        assert_eq!(again.normalized(), summary.normalized());
    }

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Research.to_string(), "research");
        let json = serde_json::to_string(&StageKind::Summarize).unwrap();
        assert_eq!(json, "\"summarize\"");
    }
}
