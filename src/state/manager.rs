//! Pure state manager functions
//!
//! Every function here takes a [`PipelineState`] by value and returns the
//! updated state; the input is consumed, so no caller can observe a state
//! half-way through an update. `updated_at` is refreshed on every mutation.
//!
//! # Examples
//!
//! ```
//! use civic_qa::state::{self, QueryAnalysis, Stage, StateUpdate};
//!
//! let state = state::create_initial("session-1", "여권 재발급 절차").unwrap();
//! let state = state::apply_update(
//!     state,
//!     StateUpdate::Analysis(QueryAnalysis {
//!         processed_query: "여권 재발급".to_string(),
//!         intent: "procedure".to_string(),
//!         confidence: 0.8,
//!         ..Default::default()
//!     }),
//! );
//! let state = state::transition(state, Stage::Retrieval, 3).unwrap();
//! assert_eq!(state.current_stage, Stage::Retrieval);
//! ```

use super::{ChatRole, ChatTurn, FailureKind, PipelineState, Stage, StateUpdate};
use crate::core::transitions::validate_transition;
use crate::error::{PipelineError, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Generate a fresh session identifier for callers that do not supply one
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build the state for a new query run
///
/// The run starts at `query_analysis` with zeroed counters, empty
/// collections and no stage payloads.
pub fn create_initial(session_id: &str, query: &str) -> Result<PipelineState> {
    if session_id.trim().is_empty() {
        return Err(PipelineError::invalid_argument(
            "session_id must not be empty",
        ));
    }
    if query.trim().is_empty() {
        return Err(PipelineError::invalid_argument("query must not be empty"));
    }

    let now = Utc::now();
    Ok(PipelineState {
        session_id: session_id.to_string(),
        user_query: query.to_string(),
        current_stage: Stage::Analysis,
        created_at: now,
        updated_at: now,
        retry_count: 0,
        analysis: None,
        retrieval: None,
        processing: None,
        response: None,
        chat_history: Vec::new(),
        processing_times: BTreeMap::new(),
        error_message: None,
        failure_kind: None,
        context: HashMap::new(),
        metadata: HashMap::new(),
    })
}

fn touch(state: PipelineState) -> PipelineState {
    PipelineState {
        updated_at: Utc::now(),
        ..state
    }
}

/// Pure: Overlay one update onto the state
pub fn apply_update(state: PipelineState, update: StateUpdate) -> PipelineState {
    let mut updated = touch(state);

    match update {
        StateUpdate::Analysis(analysis) => updated.analysis = Some(analysis),
        StateUpdate::Retrieval(retrieval) => updated.retrieval = Some(retrieval),
        StateUpdate::Processing(content) => updated.processing = Some(content),
        StateUpdate::Response(response) => updated.response = Some(response),
        StateUpdate::Context(values) => updated.context.extend(values),
        StateUpdate::Metadata(values) => updated.metadata.extend(values),
        StateUpdate::ChatTurn(turn) => updated.chat_history.push(turn),
    }

    updated
}

/// Apply multiple updates in order
pub fn apply_updates(state: PipelineState, updates: Vec<StateUpdate>) -> PipelineState {
    updates.into_iter().fold(state, apply_update)
}

/// Insert a single context hint
pub fn add_context(state: PipelineState, key: impl Into<String>, value: Value) -> PipelineState {
    apply_update(
        state,
        StateUpdate::Context(HashMap::from([(key.into(), value)])),
    )
}

/// Record how long a stage took, in seconds
///
/// Re-recording the same stage (on retry) overwrites its entry; other entries
/// are never removed.
pub fn record_duration(
    state: PipelineState,
    stage_name: &str,
    seconds: f64,
) -> Result<PipelineState> {
    if stage_name.trim().is_empty() {
        return Err(PipelineError::invalid_argument(
            "stage name must not be empty",
        ));
    }
    // Also rejects NaN.
    if !(seconds >= 0.0) || !seconds.is_finite() {
        return Err(PipelineError::invalid_argument(format!(
            "duration for {} must be a finite, non-negative number of seconds, got {}",
            stage_name, seconds
        )));
    }

    let mut updated = touch(state);
    updated
        .processing_times
        .insert(stage_name.to_string(), seconds);
    Ok(updated)
}

/// Move the run to the error stage as a stage failure
///
/// Increments `retry_count`. The retry budget is not checked here; that is
/// the router's decision via [`can_retry`].
pub fn enter_error(state: PipelineState, message: &str) -> Result<PipelineState> {
    enter_failure(state, FailureKind::StageFailure, message)
}

/// Move the run to the error stage with an explicit failure kind
pub fn enter_failure(
    state: PipelineState,
    kind: FailureKind,
    message: &str,
) -> Result<PipelineState> {
    if message.trim().is_empty() {
        return Err(PipelineError::invalid_argument(
            "error message must not be empty",
        ));
    }

    let retry_count = state.retry_count.saturating_add(1);
    Ok(PipelineState {
        current_stage: Stage::Error,
        error_message: Some(message.to_string()),
        failure_kind: Some(kind),
        retry_count,
        ..touch(state)
    })
}

/// Whether another attempt is allowed
pub fn can_retry(state: &PipelineState, max_retries: u32) -> bool {
    state.retry_count < max_retries
}

/// Move the run to `to` after validating the move against the rule table
///
/// Entering `error` is not done here since it needs a message; use
/// [`enter_error`]. Leaving `error` clears the error diagnostics and drops the
/// payloads of the resumed stage and everything after it.
pub fn transition(state: PipelineState, to: Stage, max_retries: u32) -> Result<PipelineState> {
    if to == Stage::Error {
        return Err(PipelineError::invalid_argument(
            "entering the error stage requires a message; use enter_error",
        ));
    }
    validate_transition(&state, to, max_retries)?;

    let mut updated = touch(state);
    if updated.current_stage == Stage::Error {
        updated.error_message = None;
        updated.failure_kind = None;
        for stage in to.downstream() {
            updated.clear_payload(*stage);
        }
    }
    updated.current_stage = to;
    Ok(updated)
}

/// Reuse a completed run for a follow-up query in the same session
///
/// The previous exchange is appended to `chat_history`, all stage payloads
/// are dropped and the run restarts at `query_analysis`. `retry_count` and
/// `processing_times` carry over.
pub fn begin_new_query(
    state: PipelineState,
    query: &str,
    max_retries: u32,
) -> Result<PipelineState> {
    if query.trim().is_empty() {
        return Err(PipelineError::invalid_argument("query must not be empty"));
    }
    validate_transition(&state, Stage::Analysis, max_retries)?;

    let mut updated = touch(state);
    let previous_answer = updated.final_response().map(str::to_string);
    updated
        .chat_history
        .push(ChatTurn::new(ChatRole::User, updated.user_query.clone()));
    if let Some(answer) = previous_answer {
        updated
            .chat_history
            .push(ChatTurn::new(ChatRole::Assistant, answer));
    }
    for stage in Stage::PROCESSING {
        updated.clear_payload(stage);
    }
    updated.user_query = query.to_string();
    updated.current_stage = Stage::Analysis;
    Ok(updated)
}

/// Check the state invariants, reporting the first violation
pub fn check(state: &PipelineState) -> Result<()> {
    if state.session_id.trim().is_empty() {
        return Err(PipelineError::invalid_state("session_id is empty"));
    }
    if state.user_query.trim().is_empty() {
        return Err(PipelineError::invalid_state("user_query is empty"));
    }
    if state.updated_at < state.created_at {
        return Err(PipelineError::invalid_state(
            "updated_at precedes created_at",
        ));
    }
    if let Some((stage, seconds)) = state
        .processing_times
        .iter()
        .find(|(_, seconds)| !(**seconds >= 0.0) || !seconds.is_finite())
    {
        return Err(PipelineError::invalid_state(format!(
            "processing time for {} is invalid: {}",
            stage, seconds
        )));
    }
    if let Some((stage, field)) = state.non_finite_score() {
        return Err(PipelineError::invalid_state(format!(
            "{} output has a non-finite {}",
            stage, field
        )));
    }

    match state.current_stage {
        Stage::Error => {
            let has_message = state
                .error_message
                .as_deref()
                .is_some_and(|message| !message.trim().is_empty());
            if !has_message {
                return Err(PipelineError::invalid_state(
                    "error stage without an error message",
                ));
            }
        }
        Stage::Completed => {
            if state.final_response().is_none() {
                return Err(PipelineError::invalid_state(
                    "completed stage without a final response",
                ));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Whether the state satisfies its invariants
///
/// Never corrects anything; see [`check`] for the reason behind a `false`.
pub fn validate(state: &PipelineState) -> bool {
    check(state).is_ok()
}

/// Serialize to JSON, keeping non-ASCII text verbatim
///
/// Refuses states holding NaN or infinite scores, which JSON would silently
/// turn into `null`.
pub fn serialize(state: &PipelineState) -> Result<String> {
    if let Some((stage, field)) = state.non_finite_score() {
        return Err(PipelineError::invalid_state(format!(
            "{} output has a non-finite {}",
            stage, field
        )));
    }
    Ok(serde_json::to_string(state)?)
}

/// Deserialize from JSON and re-check the invariants
pub fn deserialize(json: &str) -> Result<PipelineState> {
    let state: PipelineState = serde_json::from_str(json)?;
    check(&state)?;
    Ok(state)
}
