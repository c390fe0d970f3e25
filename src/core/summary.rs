//! Run summaries for operators and logs

use crate::state::{can_retry, PipelineState, Stage};
use chrono::Duration;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    /// Stopped in `error` with retries left (e.g. a checkpoint taken mid-recovery)
    Recoverable,
    InProgress,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Recoverable => "recoverable",
            RunOutcome::InProgress => "in progress",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub session_id: String,
    pub stage: Stage,
    pub outcome: RunOutcome,
    pub retry_count: u32,
    pub stages_timed: usize,
    pub total_seconds: f64,
    /// Wall-clock time between creation and the last update
    pub elapsed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Pure: Summarize a state against the retry budget it ran under
pub fn summarize(state: &PipelineState, max_retries: u32) -> RunSummary {
    let outcome = match state.current_stage {
        Stage::Completed => RunOutcome::Completed,
        Stage::Error if can_retry(state, max_retries) && is_retryable(state) => {
            RunOutcome::Recoverable
        }
        Stage::Error => RunOutcome::Failed,
        _ => RunOutcome::InProgress,
    };

    RunSummary {
        session_id: state.session_id.clone(),
        stage: state.current_stage,
        outcome,
        retry_count: state.retry_count,
        stages_timed: state.processing_times.len(),
        total_seconds: state.total_processing_time(),
        elapsed: format_duration(state.updated_at - state.created_at),
        error_message: state.error_message.clone(),
    }
}

fn is_retryable(state: &PipelineState) -> bool {
    state
        .failure_kind
        .map(|kind| kind.is_retryable())
        .unwrap_or(true)
}

/// Format a duration with at most millisecond precision
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    let total_seconds = millis / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_seconds > 0 {
        format!("{}.{:03}s", seconds, millis % 1000)
    } else {
        format!("{}ms", millis)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session:   {}", self.session_id)?;
        writeln!(f, "Stage:     {}", self.stage)?;
        writeln!(f, "Outcome:   {}", self.outcome)?;
        writeln!(f, "Retries:   {}", self.retry_count)?;
        writeln!(
            f,
            "Timing:    {:.3}s across {} stage(s), {} elapsed",
            self.total_seconds, self.stages_timed, self.elapsed
        )?;
        if let Some(message) = &self.error_message {
            writeln!(f, "Error:     {}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{create_initial, enter_error, enter_failure, record_duration, FailureKind};

    fn initial() -> PipelineState {
        create_initial("summary-session", "전입신고 방법").unwrap()
    }

    #[test]
    fn test_summary_of_fresh_run() {
        let summary = summarize(&initial(), 3);
        assert_eq!(summary.outcome, RunOutcome::InProgress);
        assert_eq!(summary.stage, Stage::Analysis);
        assert_eq!(summary.stages_timed, 0);
        assert!(summary.error_message.is_none());
    }

    #[test]
    fn test_summary_totals_recorded_durations() {
        let state = record_duration(initial(), "query_analysis", 0.5).unwrap();
        let state = record_duration(state, "document_retrieval", 1.25).unwrap();
        let summary = summarize(&state, 3);
        assert_eq!(summary.stages_timed, 2);
        assert!((summary.total_seconds - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_outcome_for_errors() {
        let state = enter_error(initial(), "Query analysis failed: boom").unwrap();
        assert_eq!(summarize(&state, 3).outcome, RunOutcome::Recoverable);
        assert_eq!(summarize(&state, 1).outcome, RunOutcome::Failed);

        let gated =
            enter_failure(initial(), FailureKind::QualityGate, "No documents found").unwrap();
        let summary = summarize(&gated, 3);
        assert_eq!(summary.outcome, RunOutcome::Failed);
        assert_eq!(summary.error_message.as_deref(), Some("No documents found"));
        assert!(summary.to_string().contains("No documents found"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::milliseconds(42)), "42ms");
        assert_eq!(format_duration(Duration::milliseconds(1500)), "1.500s");
        assert_eq!(format_duration(Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(Duration::seconds(-3)), "0ms");
    }
}
