//! Configuration loaded from the environment.
//!
//! [`ScribeConfig::from_env`] loads `.env` (if present) and reads:
//! - `OPENAI_BASE_URL` (optional, default: `https://api.openai.com/v1`)
//! - `OPENAI_API_KEY` (required by the HTTP generation backend)
//! - `SERPER_API_KEY` (required by the search tool)
//! - `SCRIBE_REPORT_ROOT` (optional, default: current directory)
//! - `SCRIBE_MAX_RETRIES` (optional, default: 1)
//! - `SCRIBE_EVALUATE` (optional, default: true)
//! - `SCRIBE_STAGE_TIMEOUT_SECS` (optional, default: 120)
//! - `SCRIBE_TOOL_READY_SECS` (optional, default: 30)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::StageKind;
use crate::generation::ChatCompletionsConfig;
use crate::stage::{roles, RoleSpec};
use crate::tool_process::ToolProcessSpec;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level settings.
#[derive(Clone)]
pub struct ScribeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub serper_api_key: Option<String>,
    /// Root directory exposed to the filesystem tool. Reports land in
    /// `<report_root>/report`.
    pub report_root: PathBuf,
    pub max_retries: u32,
    pub evaluate: bool,
    pub stage_timeout: Duration,
    pub tool_ready_timeout: Duration,
}

impl ScribeConfig {
    /// Load `.env`, then read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let report_root = match lookup("SCRIBE_REPORT_ROOT") {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => std::env::current_dir().map_err(ConfigError::CurrentDir)?,
        };

        Ok(Self {
            base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            serper_api_key: lookup("SERPER_API_KEY").filter(|k| !k.is_empty()),
            report_root,
            max_retries: parse_var(&lookup, "SCRIBE_MAX_RETRIES", 1)?,
            evaluate: parse_bool(&lookup, "SCRIBE_EVALUATE", true)?,
            stage_timeout: Duration::from_secs(parse_var(&lookup, "SCRIBE_STAGE_TIMEOUT_SECS", 120)?),
            tool_ready_timeout: Duration::from_secs(parse_var(&lookup, "SCRIBE_TOOL_READY_SECS", 30)?),
        })
    }

    /// Settings for the HTTP generation backend.
    pub fn chat_config(&self) -> ConfigResult<ChatCompletionsConfig> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
        Ok(ChatCompletionsConfig::new(&self.base_url, api_key)
            .with_request_timeout(self.stage_timeout))
    }

    pub fn require_search_key(&self) -> ConfigResult<&str> {
        self.serper_api_key
            .as_deref()
            .ok_or(ConfigError::MissingVar("SERPER_API_KEY"))
    }

    /// Launch spec of the search tool, when a key is configured.
    pub fn search_tool(&self) -> Option<ToolProcessSpec> {
        self.serper_api_key.as_ref().map(|key| {
            ToolProcessSpec::serper_search(key.clone())
                .with_readiness_timeout(self.tool_ready_timeout)
        })
    }

    pub fn filesystem_tool(&self) -> ToolProcessSpec {
        ToolProcessSpec::filesystem(&self.report_root)
            .with_readiness_timeout(self.tool_ready_timeout)
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut tools = Vec::new();
        tools.extend(self.search_tool());
        tools.push(self.filesystem_tool());

        PipelineConfig {
            max_retries: self.max_retries,
            evaluate: self.evaluate,
            roles: PipelineConfig::default()
                .with_stage_timeout(self.stage_timeout)
                .roles,
            tools,
            report_dir: self.report_root.join("report"),
            ..PipelineConfig::default()
        }
    }
}

impl std::fmt::Debug for ScribeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScribeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("serper_api_key", &self.serper_api_key.as_ref().map(|_| "<redacted>"))
            .field("report_root", &self.report_root)
            .field("max_retries", &self.max_retries)
            .field("evaluate", &self.evaluate)
            .field("stage_timeout", &self.stage_timeout)
            .field("tool_ready_timeout", &self.tool_ready_timeout)
            .finish()
    }
}

/// Settings for one [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Research retries allowed after a failed critique.
    pub max_retries: u32,
    /// Whether the evaluator runs at all.
    pub evaluate: bool,
    pub roles: Vec<RoleSpec>,
    /// Tool processes acquired for every admitted run, in order.
    pub tools: Vec<ToolProcessSpec>,
    pub max_searches: usize,
    /// Directory the report file is written to.
    pub report_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            evaluate: true,
            roles: vec![
                roles::guardrail(),
                roles::plan(),
                roles::research(),
                roles::evaluate(),
                roles::summarize(),
            ],
            tools: Vec::new(),
            max_searches: 5,
            report_dir: PathBuf::from("report"),
        }
    }
}

impl PipelineConfig {
    /// Settings for `kind`, falling back to the built-in defaults.
    pub fn role(&self, kind: StageKind) -> RoleSpec {
        self.roles
            .iter()
            .find(|r| r.kind == kind)
            .cloned()
            .unwrap_or_else(|| roles::default_spec(kind))
    }

    /// Replace the settings for `spec.kind`.
    pub fn with_role(mut self, spec: RoleSpec) -> Self {
        self.roles.retain(|r| r.kind != spec.kind);
        self.roles.push(spec);
        self
    }

    pub fn with_tool(mut self, spec: ToolProcessSpec) -> Self {
        self.tools.push(spec);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_evaluate(mut self, evaluate: bool) -> Self {
        self.evaluate = evaluate;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Apply one timeout to every role. The guardrail only ever gets
    /// tighter: it runs before any tool starts and keeps its short bound.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        for role in &mut self.roles {
            role.timeout = match role.kind {
                StageKind::Guardrail => role.timeout.min(timeout),
                _ => timeout,
            };
        }
        self
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> ConfigResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str, default: bool) -> ConfigResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(value) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_process::ToolKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ScribeConfig::from_lookup(lookup(&[("SCRIBE_REPORT_ROOT", "/srv")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 1);
        assert!(config.evaluate);
        assert_eq!(config.stage_timeout, Duration::from_secs(120));
        assert_eq!(config.tool_ready_timeout, Duration::from_secs(30));
        assert!(config.chat_config().is_err());
        assert!(config.require_search_key().is_err());
    }

    #[test]
    fn test_overrides_and_pipeline_config() {
        let config = ScribeConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SERPER_API_KEY", "serper-test"),
            ("SCRIBE_REPORT_ROOT", "/srv/scribe"),
            ("SCRIBE_MAX_RETRIES", "3"),
            ("SCRIBE_EVALUATE", "false"),
            ("SCRIBE_STAGE_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.max_retries, 3);
        assert!(!pipeline.evaluate);
        assert_eq!(pipeline.report_dir, PathBuf::from("/srv/scribe/report"));
        assert_eq!(
            pipeline.tools.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![ToolKind::Search, ToolKind::Filesystem]
        );
        assert!(pipeline
            .roles
            .iter()
            .all(|r| r.timeout == Duration::from_secs(10)));
        assert_eq!(config.chat_config().unwrap().api_key, "sk-test");
    }

    #[test]
    fn test_long_stage_timeout_keeps_guardrail_bound() {
        let config = ScribeConfig::from_lookup(lookup(&[
            ("SCRIBE_REPORT_ROOT", "/srv"),
            ("SCRIBE_STAGE_TIMEOUT_SECS", "600"),
        ]))
        .unwrap();
        let pipeline = config.pipeline_config();

        assert_eq!(
            pipeline.role(StageKind::Guardrail).timeout,
            roles::guardrail().timeout
        );
        for kind in [
            StageKind::Plan,
            StageKind::Research,
            StageKind::Evaluate,
            StageKind::Summarize,
        ] {
            assert_eq!(pipeline.role(kind).timeout, Duration::from_secs(600), "{kind}");
        }
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = ScribeConfig::from_lookup(lookup(&[
            ("SCRIBE_REPORT_ROOT", "/srv"),
            ("SCRIBE_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SCRIBE_MAX_RETRIES"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = ScribeConfig::from_lookup(lookup(&[
            ("SCRIBE_REPORT_ROOT", "/srv"),
            ("OPENAI_API_KEY", "sk-secret"),
        ]))
        .unwrap();
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn test_with_role_replaces_existing() {
        let config = PipelineConfig::default()
            .with_role(roles::plan().with_model("gpt-4.1"));
        assert_eq!(config.role(StageKind::Plan).model, "gpt-4.1");
        assert_eq!(config.roles.len(), 5);
    }
}
