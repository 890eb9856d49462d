//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - The `scribe.run` span, tagged with `run_id`, that the pipeline wraps
//!   around each run with `Instrument`
//! - Emission functions for key lifecycle events: run start/finish, stage
//!   start/finish, tool acquire/release, feedback retries
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use tracing::info;

use crate::domain::{ErrorKind, StageKind};
use crate::tool_process::{ToolKind, ToolStatus};

/// Span for one run. Stage, tool, and backend logs emitted inside it carry
/// the run id.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("scribe.run", run_id = %run_id)
}

/// Emit event: run started for a topic.
pub fn emit_run_started(run_id: &str, topic: &str) {
    info!(event = "run.started", run_id = %run_id, topic = %topic);
}

/// Emit event: run reached a terminal status.
pub fn emit_run_finished(run_id: &str, status: &str, duration_ms: u64, kind: Option<ErrorKind>) {
    match kind {
        Some(kind) => info!(
            event = "run.finished",
            run_id = %run_id,
            status = %status,
            duration_ms = duration_ms,
            error_kind = %kind,
        ),
        None => info!(
            event = "run.finished",
            run_id = %run_id,
            status = %status,
            duration_ms = duration_ms,
        ),
    }
}

/// Emit event: a stage invocation started.
pub fn emit_stage_started(run_id: &str, stage: StageKind) {
    info!(event = "stage.started", run_id = %run_id, stage = %stage);
}

/// Emit event: a stage invocation finished (successfully or not).
pub fn emit_stage_finished(run_id: &str, stage: StageKind, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a tool process became ready.
pub fn emit_tool_acquired(tool_id: &str, kind: ToolKind, startup_ms: u64) {
    info!(event = "tool.acquired", tool_id = %tool_id, kind = %kind, startup_ms = startup_ms);
}

/// Emit event: a tool process was released.
pub fn emit_tool_released(tool_id: &str, status: ToolStatus) {
    info!(event = "tool.released", tool_id = %tool_id, status = ?status);
}

/// Emit event: research is re-run after a failed critique.
pub fn emit_feedback_retry(run_id: &str, retry: u32, max_retries: u32, verdict: &str) {
    info!(
        event = "pipeline.feedback_retry",
        run_id = %run_id,
        retry = retry,
        max_retries = max_retries,
        verdict = %verdict,
    );
}

/// Emit event: a tool could not be shut down cleanly (warning level).
pub fn emit_tool_release_error(tool_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "tool.release_error", tool_id = %tool_id, error = %error);
}
