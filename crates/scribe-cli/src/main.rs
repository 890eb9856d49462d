//! Scribe - staged research reports from a single topic
//!
//! The `scribe` command chains a guardrail, planner, researcher, evaluator
//! and summarizer over an OpenAI-compatible backend.
//!
//! ## Commands
//!
//! - `run`: Full pipeline, printing the markdown report
//! - `check`: Admission check only
//! - `plan`: Admission check and search plan
//! - `search`: One direct call to the search tool

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, Level};

use scribe_core::{
    ChatCompletionsBackend, GenerationBackend, Pipeline, RunOutcome, RunStatus, ScribeConfig,
    StdioLauncher, ToolProcessHandle,
};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(author = "Scribe Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged research-report orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and print the markdown report
    Run {
        /// Topic to research
        topic: String,

        /// Research retries allowed after a failed evaluation
        #[arg(long, env = "SCRIBE_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Skip the evaluator and its feedback loop
        #[arg(long)]
        no_evaluate: bool,

        /// Directory exposed to the filesystem tool; the report is written
        /// to `<root>/report`
        #[arg(long, env = "SCRIBE_REPORT_ROOT")]
        report_root: Option<PathBuf>,

        /// Also write the markdown report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full run outcome as JSON instead of the report
        #[arg(long)]
        outcome: bool,
    },

    /// Check whether a topic would be admitted
    Check {
        /// Topic to check
        topic: String,
    },

    /// Print the search plan for a topic
    Plan {
        /// Topic to plan
        topic: String,
    },

    /// Run one web search through the search tool
    Search {
        /// Search query
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scribe_core::telemetry::init_tracing(cli.json, level);

    let mut config = ScribeConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            topic,
            max_retries,
            no_evaluate,
            report_root,
            output,
            outcome,
        } => {
            if let Some(max_retries) = max_retries {
                config.max_retries = max_retries;
            }
            if no_evaluate {
                config.evaluate = false;
            }
            if let Some(root) = report_root {
                config.report_root = root;
            }
            config
                .require_search_key()
                .context("The search tool needs an API key")?;
            let pipeline = build_pipeline(&config, http_backend(&config)?);
            cmd_run(&pipeline, &topic, output.as_deref(), outcome).await
        }
        Commands::Check { topic } => {
            let pipeline = build_pipeline(&config, http_backend(&config)?);
            cmd_check(&pipeline, &topic).await
        }
        Commands::Plan { topic } => {
            let pipeline = build_pipeline(&config, http_backend(&config)?);
            cmd_plan(&pipeline, &topic).await
        }
        Commands::Search { query } => cmd_search(&config, &query).await,
    }
}

fn http_backend(config: &ScribeConfig) -> Result<Arc<dyn GenerationBackend>> {
    let chat = config
        .chat_config()
        .context("The generation backend needs an API key")?;
    let backend = ChatCompletionsBackend::new(chat).context("Failed to create HTTP client")?;
    Ok(Arc::new(backend))
}

fn build_pipeline(config: &ScribeConfig, backend: Arc<dyn GenerationBackend>) -> Pipeline {
    Pipeline::from_config(config.pipeline_config(), backend)
}

/// Run the full pipeline.
async fn cmd_run(
    pipeline: &Pipeline,
    topic: &str,
    output: Option<&Path>,
    print_outcome: bool,
) -> Result<()> {
    let outcome = pipeline.run(topic).await;

    if print_outcome {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match outcome.status {
        RunStatus::Completed => {
            let artifact = outcome.artifact.as_deref().unwrap_or_default();
            if let Some(path) = output {
                std::fs::write(path, artifact)
                    .with_context(|| format!("Failed to write report to {:?}", path))?;
                info!(path = %path.display(), "report written");
            }
            if !print_outcome {
                print!("{artifact}");
            }
            Ok(())
        }
        RunStatus::Rejected => {
            if !print_outcome {
                println!("Rejected: {}", rationale(&outcome));
            }
            Ok(())
        }
        RunStatus::Accepted | RunStatus::Failed => bail!(failure_message(&outcome)),
    }
}

/// Admission check only.
async fn cmd_check(pipeline: &Pipeline, topic: &str) -> Result<()> {
    let outcome = pipeline.check(topic).await;
    match outcome.status {
        RunStatus::Accepted => println!("Accepted: {}", rationale(&outcome)),
        RunStatus::Rejected => println!("Rejected: {}", rationale(&outcome)),
        RunStatus::Completed | RunStatus::Failed => bail!(failure_message(&outcome)),
    }
    Ok(())
}

/// Admission check followed by planning; prints the plan as JSON.
async fn cmd_plan(pipeline: &Pipeline, topic: &str) -> Result<()> {
    let outcome = pipeline.plan(topic).await;
    match (&outcome.status, &outcome.plan) {
        (RunStatus::Accepted, Some(plan)) => {
            println!("{}", serde_json::to_string_pretty(plan)?);
            Ok(())
        }
        (RunStatus::Rejected, _) => {
            println!("Rejected: {}", rationale(&outcome));
            Ok(())
        }
        _ => bail!(failure_message(&outcome)),
    }
}

/// One direct search-tool call.
async fn cmd_search(config: &ScribeConfig, query: &str) -> Result<()> {
    let spec = config
        .search_tool()
        .context("The search tool needs an API key (SERPER_API_KEY)")?;
    let launcher = StdioLauncher::new();
    let handle = ToolProcessHandle::acquire(&launcher, spec)
        .await
        .context("Failed to start the search tool")?;

    let result = handle
        .call_tool("google_search", json!({ "q": query }))
        .await;
    handle.release().await;

    let text = result.context("Search failed")?;
    println!("{text}");
    Ok(())
}

fn rationale(outcome: &RunOutcome) -> &str {
    outcome.rationale.as_deref().unwrap_or("no rationale given")
}

fn failure_message(outcome: &RunOutcome) -> String {
    match &outcome.failure {
        Some(failure) => {
            let after = failure
                .last_completed_stage
                .map(|s| format!(" (after {s})"))
                .unwrap_or_default();
            format!(
                "Run {} failed with {}{}: {}",
                outcome.run_id, failure.kind, after, failure.message
            )
        }
        None => format!("Run {} ended {}", outcome.run_id, outcome.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::fakes::{CountingLauncher, ScriptedBackend};
    use scribe_core::{ErrorKind, StageKind, ToolKind, ToolProcessSpec};
    use serde_json::json;

    fn fake_pipeline(backend: ScriptedBackend) -> Pipeline {
        Pipeline::builder(Arc::new(backend))
            .launcher(Arc::new(CountingLauncher::new()))
            .tool(ToolProcessSpec::new("search", ToolKind::Search, "fake"))
            .build()
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "scribe",
            "--json",
            "run",
            "Best agentic AI model in 2025",
            "--max-retries",
            "2",
            "--no-evaluate",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                topic,
                max_retries,
                no_evaluate,
                ..
            } => {
                assert_eq!(topic, "Best agentic AI model in 2025");
                assert_eq!(max_retries, Some(2));
                assert!(no_evaluate);
            }
            _ => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn test_cmd_run_writes_report_file() {
        let pipeline = fake_pipeline(ScriptedBackend::happy_path(&["rust async"]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");

        cmd_run(&pipeline, "rust async runtimes", Some(&path), false)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "# Report\n\nFindings.\n");
    }

    #[tokio::test]
    async fn test_cmd_run_rejection_is_not_an_error() {
        let pipeline = fake_pipeline(ScriptedBackend::new().respond(
            StageKind::Guardrail,
            json!({ "accepted": false, "rationale": "Personal question." }),
        ));
        assert!(cmd_run(&pipeline, "What is my name?", None, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_cmd_run_failure_names_kind_and_stage() {
        let backend = ScriptedBackend::happy_path(&["rust"])
            .reset(StageKind::Research)
            .respond(StageKind::Research, json!({ "summary": "", "body": "" }));
        let pipeline = fake_pipeline(backend);

        let err = cmd_run(&pipeline, "rust", None, false).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&ErrorKind::MalformedOutput.to_string()));
        assert!(message.contains("after plan"));
    }

    #[tokio::test]
    async fn test_cmd_check_and_plan() {
        let pipeline = fake_pipeline(ScriptedBackend::happy_path(&["rust", "tokio"]));
        assert!(cmd_check(&pipeline, "rust async runtimes").await.is_ok());
        assert!(cmd_plan(&pipeline, "rust async runtimes").await.is_ok());
    }

    #[test]
    fn test_search_requires_key() {
        let config = ScribeConfig::from_lookup(|key| match key {
            "SCRIBE_REPORT_ROOT" => Some("/tmp".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(config.search_tool().is_none());
    }
}
