//! Role contracts: prompt, schema, invariants and tool work per role.

use std::fmt::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::role::RoleContract;
use crate::domain::{
    Critique, GuardrailVerdict, ResearchReport, ResearchRequest, SearchPlan, StageResult,
    SummarizeRequest, Summary, Topic,
};
use crate::tool_process::{ToolKind, ToolSet};

/// Strict-mode object schema: every property required, nothing extra.
fn object_schema(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Admission classification of a topic.
#[derive(Debug, Clone, Default)]
pub struct GuardrailContract;

impl RoleContract for GuardrailContract {
    type Input = Topic;
    type Output = GuardrailVerdict;

    fn check_input(&self, input: &Topic) -> Result<(), String> {
        if input.is_blank() {
            return Err("topic is blank".to_string());
        }
        Ok(())
    }

    fn render_prompt(&self, input: &Topic, _gathered: &str) -> String {
        format!("Topic: {input}")
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({
            "accepted": { "type": "boolean" },
            "rationale": { "type": "string" },
        }))
    }

    fn check_output(&self, output: &GuardrailVerdict) -> Result<(), String> {
        output.check()
    }
}

/// Turns a topic into a list of web searches.
#[derive(Debug, Clone, Default)]
pub struct PlanContract;

impl RoleContract for PlanContract {
    type Input = Topic;
    type Output = SearchPlan;

    fn check_input(&self, input: &Topic) -> Result<(), String> {
        if input.is_blank() {
            return Err("topic is blank".to_string());
        }
        Ok(())
    }

    fn render_prompt(&self, input: &Topic, _gathered: &str) -> String {
        format!("Query: {input}")
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({
            "queries": {
                "type": "array",
                "items": object_schema(json!({
                    "term": { "type": "string" },
                    "rationale": { "type": "string" },
                })),
            },
        }))
    }

    fn check_output(&self, output: &SearchPlan) -> Result<(), String> {
        output.check()
    }
}

/// Runs the planned searches and writes the report.
#[derive(Debug, Clone)]
pub struct ResearchContract {
    /// Name of the search tool exposed by the search process.
    pub search_tool: String,
    /// Upper bound on searches per attempt.
    pub max_searches: usize,
}

impl Default for ResearchContract {
    fn default() -> Self {
        Self {
            search_tool: "google_search".to_string(),
            max_searches: 5,
        }
    }
}

impl ResearchContract {
    pub fn new(max_searches: usize) -> Self {
        Self {
            max_searches,
            ..Self::default()
        }
    }
}

#[async_trait]
impl RoleContract for ResearchContract {
    type Input = ResearchRequest;
    type Output = ResearchReport;

    fn check_input(&self, input: &ResearchRequest) -> Result<(), String> {
        input.plan.check()
    }

    fn render_prompt(&self, input: &ResearchRequest, gathered: &str) -> String {
        let mut prompt = format!("Original query: {}\n\nPlanned searches:\n", input.topic);
        for item in &input.plan.queries {
            let _ = writeln!(prompt, "- {} ({})", item.term, item.rationale);
        }
        if !gathered.is_empty() {
            let _ = write!(prompt, "\nSearch results:\n{gathered}");
        }
        if let Some(critique) = &input.critique {
            let _ = write!(
                prompt,
                "\nThe previous report was rejected by the reviewer.\nVerdict: {}\nReasoning: {}\nAddress this feedback in the new report.\n",
                critique.verdict, critique.rationale
            );
        }
        prompt
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({
            "summary": { "type": "string" },
            "body": { "type": "string" },
        }))
    }

    fn check_output(&self, output: &ResearchReport) -> Result<(), String> {
        output.check()
    }

    async fn gather(&self, input: &ResearchRequest, tools: &ToolSet) -> StageResult<String> {
        let Some(search) = tools.get(ToolKind::Search) else {
            return Ok(String::new());
        };

        let mut gathered = String::new();
        for item in input.plan.queries.iter().take(self.max_searches) {
            debug!(tool_id = %search.id(), term = %item.term, "searching");
            let text = search
                .call_tool(&self.search_tool, json!({ "q": item.term }))
                .await?;
            let _ = write!(gathered, "### {}\n{}\n\n", item.term, text.trim());
        }
        Ok(gathered)
    }
}

/// Reviews a research report's structure and flow.
#[derive(Debug, Clone, Default)]
pub struct EvaluateContract;

impl RoleContract for EvaluateContract {
    type Input = ResearchReport;
    type Output = Critique;

    fn check_input(&self, input: &ResearchReport) -> Result<(), String> {
        input.check()
    }

    fn render_prompt(&self, input: &ResearchReport, _gathered: &str) -> String {
        input.body.clone()
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({
            "passed": { "type": "boolean" },
            "verdict": { "type": "string" },
            "rationale": { "type": "string" },
        }))
    }
}

/// Condenses the run's reports into markdown and writes the report file.
#[derive(Debug, Clone)]
pub struct SummarizeContract {
    /// Directory the report file is written to, as seen by the filesystem
    /// tool.
    pub report_dir: PathBuf,
}

impl SummarizeContract {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    /// Path of the report file for `topic`.
    pub fn report_path(&self, topic: &Topic) -> PathBuf {
        self.report_dir.join(format!("{}.md", topic.slug()))
    }
}

#[async_trait]
impl RoleContract for SummarizeContract {
    type Input = SummarizeRequest;
    type Output = Summary;

    fn check_input(&self, input: &SummarizeRequest) -> Result<(), String> {
        if input.reports.is_empty() {
            return Err("nothing to summarize".to_string());
        }
        input.reports.iter().try_for_each(ResearchReport::check)
    }

    fn render_prompt(&self, input: &SummarizeRequest, _gathered: &str) -> String {
        let bodies: Vec<&str> = input.reports.iter().map(|r| r.body.as_str()).collect();
        format!("Title: {}\n\n{}", input.topic, bodies.join("\n\n"))
    }

    fn output_schema(&self) -> Value {
        object_schema(json!({
            "markdown": { "type": "string" },
        }))
    }

    fn check_output(&self, output: &Summary) -> Result<(), String> {
        output.check()
    }

    async fn deliver(
        &self,
        input: &SummarizeRequest,
        output: &Summary,
        tools: &ToolSet,
    ) -> StageResult<()> {
        let Some(fs) = tools.get(ToolKind::Filesystem) else {
            return Ok(());
        };

        let dir = self.report_dir.to_string_lossy().into_owned();
        let path = self.report_path(&input.topic).to_string_lossy().into_owned();
        fs.call_tool("create_directory", json!({ "path": dir }))
            .await?;
        fs.call_tool(
            "write_file",
            json!({ "path": path, "content": output.normalized() }),
        )
        .await?;
        info!(event = "report.written", path = %path);
        Ok(())
    }
}
