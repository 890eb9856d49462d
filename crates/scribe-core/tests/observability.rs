//! Observability tests for the run lifecycle.
//!
//! These verify that the structured lifecycle events are emitted by the
//! `obs` helpers and by a real pipeline run.

use std::sync::Arc;

use scribe_core::fakes::{CountingLauncher, ScriptedBackend};
use scribe_core::obs::{
    emit_feedback_retry, emit_run_finished, emit_run_started, emit_stage_finished,
    emit_stage_started, emit_tool_acquired, emit_tool_release_error, emit_tool_released, run_span,
};
use scribe_core::{
    ErrorKind, Pipeline, StageKind, ToolKind, ToolProcessSpec, ToolStatus, TraceEvent,
    TraceSink, TraceStatus, TracingSink,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_run_id_and_topic() {
    emit_run_started("run-123", "rust async runtimes");
    assert!(logs_contain("run.started"));
    assert!(logs_contain("run-123"));
}

#[traced_test]
#[test]
fn test_emit_run_finished_logs_error_kind() {
    emit_run_finished("run-456", "failed", 5000, Some(ErrorKind::StageTimeout));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("stage_timeout"));
}

#[traced_test]
#[test]
fn test_emit_stage_events() {
    emit_stage_started("run-789", StageKind::Research);
    emit_stage_finished("run-789", StageKind::Research, 42, true);
    assert!(logs_contain("stage.started"));
    assert!(logs_contain("stage.finished"));
    assert!(logs_contain("research"));
}

#[traced_test]
#[test]
fn test_emit_tool_events() {
    emit_tool_acquired("serper-search", ToolKind::Search, 812);
    emit_tool_released("serper-search", ToolStatus::Closed);
    assert!(logs_contain("tool.acquired"));
    assert!(logs_contain("tool.released"));
}

#[traced_test]
#[test]
fn test_emit_feedback_retry() {
    emit_feedback_retry("run-retry", 1, 2, "missing conclusion");
    assert!(logs_contain("pipeline.feedback_retry"));
    assert!(logs_contain("missing conclusion"));
}

/// WARN-level events are captured by traced_test.
#[traced_test]
#[test]
fn test_emit_tool_release_error_logs_warning() {
    emit_tool_release_error("filesystem", &"kill failed");
    assert!(logs_contain("tool.release_error"));
    assert!(logs_contain("kill failed"));
}

#[traced_test]
#[test]
fn test_run_span_tags_nested_events_with_run_id() {
    run_span("span-run-42").in_scope(|| {
        emit_stage_started("span-run-42", StageKind::Plan);
        tracing::debug!("inside the run");
    });
    assert!(logs_contain("scribe.run"));
    assert!(logs_contain("inside the run"));
    assert!(logs_contain("span-run-42"));
}

#[traced_test]
#[test]
fn test_tracing_sink_forwards_events() {
    TracingSink.record(TraceEvent::new(
        "run-trace",
        StageKind::Plan,
        TraceStatus::Finished,
        17,
        "{\"queries\":[]}",
    ));
    assert!(logs_contain("run-trace"));
    assert!(logs_contain("finished"));
}

#[traced_test]
#[tokio::test]
async fn test_pipeline_run_emits_lifecycle_events() {
    let launcher = CountingLauncher::new();
    let pipeline = Pipeline::builder(Arc::new(ScriptedBackend::happy_path(&["rust"])))
        .launcher(Arc::new(launcher.clone()))
        .tool(ToolProcessSpec::new("search", ToolKind::Search, "fake"))
        .build();

    let outcome = pipeline.run("rust async runtimes").await;
    assert!(outcome.is_completed());

    assert!(logs_contain("run.started"));
    assert!(logs_contain("tool.acquired"));
    assert!(logs_contain("stage.finished"));
    assert!(logs_contain("tool.released"));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain(&outcome.run_id.to_string()));
}
