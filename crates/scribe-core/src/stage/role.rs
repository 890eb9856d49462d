//! The single parameterised stage implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{malformed, Stage, StageContext};
use crate::domain::{StageError, StageKind, StageResult};
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::tool_process::{ToolKind, ToolSet};

/// Declarative settings for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub kind: StageKind,
    pub model: String,
    pub instructions: String,
    pub reasoning_effort: Option<String>,
    /// Bound on the whole stage, tool work included.
    pub timeout: Duration,
    /// Tools that must be present in the run for this role to execute.
    pub required_tools: Vec<ToolKind>,
}

impl RoleSpec {
    pub fn new(kind: StageKind, model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            instructions: instructions.into(),
            reasoning_effort: None,
            timeout: Duration::from_secs(120),
            required_tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_required_tool(mut self, kind: ToolKind) -> Self {
        if !self.required_tools.contains(&kind) {
            self.required_tools.push(kind);
        }
        self
    }
}

/// The role-specific half of a [`RoleStage`].
///
/// Invariant checks return the violated rule as a string; the stage turns
/// it into `MalformedOutput`.
#[async_trait]
pub trait RoleContract: Send + Sync {
    type Input: Send + Sync;
    type Output: DeserializeOwned + Serialize + Send + Sync;

    fn check_input(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    /// Render the user prompt. `gathered` is whatever [`RoleContract::gather`]
    /// returned, empty when the role does no tool work.
    fn render_prompt(&self, input: &Self::Input, gathered: &str) -> String;

    fn output_schema(&self) -> Value;

    fn check_output(&self, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }

    /// Tool work before generation.
    async fn gather(&self, _input: &Self::Input, _tools: &ToolSet) -> StageResult<String> {
        Ok(String::new())
    }

    /// Tool work after a valid output has been produced.
    async fn deliver(
        &self,
        _input: &Self::Input,
        _output: &Self::Output,
        _tools: &ToolSet,
    ) -> StageResult<()> {
        Ok(())
    }
}

/// A stage backed by the generation backend.
pub struct RoleStage<C> {
    contract: C,
    spec: RoleSpec,
    backend: Arc<dyn GenerationBackend>,
}

impl<C: RoleContract> RoleStage<C> {
    pub fn new(contract: C, spec: RoleSpec, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            contract,
            spec,
            backend,
        }
    }

    pub fn spec(&self) -> &RoleSpec {
        &self.spec
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    async fn generate(&self, input: &C::Input, tools: &ToolSet) -> StageResult<C::Output> {
        let kind = self.spec.kind;
        let gathered = self.contract.gather(input, tools).await?;

        let request = GenerationRequest {
            stage: kind,
            model: self.spec.model.clone(),
            instructions: self.spec.instructions.clone(),
            prompt: self.contract.render_prompt(input, &gathered),
            schema: self.contract.output_schema(),
            reasoning_effort: self.spec.reasoning_effort.clone(),
        };
        let value = self.backend.generate(&request).await?;

        let output: C::Output =
            serde_json::from_value(value).map_err(|e| malformed(kind, e))?;
        self.contract
            .check_output(&output)
            .map_err(|reason| malformed(kind, reason))?;

        self.contract.deliver(input, &output, tools).await?;
        Ok(output)
    }
}

#[async_trait]
impl<C: RoleContract> Stage for RoleStage<C> {
    type Input = C::Input;
    type Output = C::Output;

    fn kind(&self) -> StageKind {
        self.spec.kind
    }

    fn validate(&self, input: &Self::Input) -> StageResult<()> {
        self.contract
            .check_input(input)
            .map_err(|reason| malformed(self.spec.kind, reason))
    }

    async fn execute(
        &self,
        input: &Self::Input,
        cx: &StageContext<'_>,
    ) -> StageResult<Self::Output> {
        for kind in &self.spec.required_tools {
            cx.tools.require(*kind)?;
        }

        match tokio::time::timeout(self.spec.timeout, self.generate(input, cx.tools)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(StageError::timeout(format!(
                "{} exceeded {}ms",
                self.spec.kind,
                self.spec.timeout.as_millis()
            ))),
        }
    }
}
