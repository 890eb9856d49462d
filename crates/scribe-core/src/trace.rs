//! Per-stage trace events.
//!
//! A [`TraceSink`] is the only resource shared across runs. Implementations
//! must be cheap and must never block the pipeline; `record` cannot fail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::StageKind;

/// Maximum length of [`TraceEvent::summary`], in bytes.
pub const SUMMARY_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Started,
    Finished,
    Failed,
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TraceStatus::Started => "started",
            TraceStatus::Finished => "finished",
            TraceStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One stage boundary crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub run_id: String,
    pub stage: StageKind,
    pub status: TraceStatus,
    /// Zero for `Started`.
    pub duration_ms: u64,
    /// Truncated JSON of the output, or the error kind and message.
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(
        run_id: impl Into<String>,
        stage: StageKind,
        status: TraceStatus,
        duration_ms: u64,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage,
            status,
            duration_ms,
            summary: truncate_summary(&summary.into()),
            at: Utc::now(),
        }
    }
}

/// Receives trace events from every run.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// Forwards trace events into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: TraceEvent) {
        info!(
            event = "trace",
            run_id = %event.run_id,
            stage = %event.stage,
            status = %event.status,
            duration_ms = event.duration_ms,
            summary = %event.summary,
        );
    }
}

/// Cut `text` to at most [`SUMMARY_LIMIT`] bytes on a char boundary.
pub fn truncate_summary(text: &str) -> String {
    if text.len() <= SUMMARY_LIMIT {
        return text.to_string();
    }
    let mut end = SUMMARY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_summary("{\"ok\":true}"), "{\"ok\":true}");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(SUMMARY_LIMIT);
        let cut = truncate_summary(&text);
        assert!(cut.ends_with('…'));
        assert!(cut.len() <= SUMMARY_LIMIT + '…'.len_utf8());
    }

    #[test]
    fn test_event_summary_is_truncated() {
        let event = TraceEvent::new(
            "run",
            StageKind::Research,
            TraceStatus::Finished,
            12,
            "x".repeat(4 * SUMMARY_LIMIT),
        );
        assert!(event.summary.len() <= SUMMARY_LIMIT + '…'.len_utf8());
    }
}
