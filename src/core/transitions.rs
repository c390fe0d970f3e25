//! Pure stage transition rules
//!
//! Declares which stage-to-stage moves are legal. All functions are pure and
//! are consulted by the state manager before any stage change.
//!
//! # Valid Transitions
//!
//! ```text
//!   query_analysis ──► document_retrieval ──► content_processing ──► response_generation ──► completed
//!         │                    │                      │                       │                  │
//!         └────────────────────┴──────────┬───────────┴───────────────────────┘                  │
//!                                         ▼                                                      │
//!                                       error ──► (any processing stage, on retry)               │
//!                                                                                                │
//!   query_analysis ◄─────────────────────────── new query in the same session ───────────────────┘
//! ```

use crate::state::{PipelineState, Stage};
use std::fmt;

/// Why a requested transition was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The pair is not in the rule table
    NotAllowed { from: Stage, to: Stage },
    /// `completed` requires a non-empty final response
    MissingFinalResponse,
    /// `error` is refused once the retry budget is spent
    RetryLimitReached { retry_count: u32, max_retries: u32 },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::NotAllowed { from, to } => {
                write!(f, "Invalid transition from {} to {}", from, to)
            }
            TransitionError::MissingFinalResponse => {
                write!(f, "Cannot complete without final response")
            }
            TransitionError::RetryLimitReached {
                retry_count,
                max_retries,
            } => write!(
                f,
                "Maximum retry limit reached ({} of {})",
                retry_count, max_retries
            ),
        }
    }
}

impl std::error::Error for TransitionError {}

/// Pure: Stages reachable from `stage` in one move
pub fn valid_transitions_from(stage: Stage) -> &'static [Stage] {
    use Stage::*;
    match stage {
        Analysis => &[Retrieval, Error],
        Retrieval => &[Processing, Error],
        Processing => &[Generation, Error],
        Generation => &[Completed, Error],
        Error => &[Analysis, Retrieval, Processing, Generation],
        Completed => &[Analysis],
    }
}

/// Pure: Table lookup only
pub fn is_valid(from: Stage, to: Stage) -> bool {
    valid_transitions_from(from).contains(&to)
}

/// Pure: Validate moving `state` to `to`
///
/// Layers two business rules over the table: completion needs a final
/// response, and entering `error` is refused once `retry_count` has reached
/// `max_retries`.
pub fn validate_transition(
    state: &PipelineState,
    to: Stage,
    max_retries: u32,
) -> Result<(), TransitionError> {
    let from = state.current_stage;
    if !is_valid(from, to) {
        return Err(TransitionError::NotAllowed { from, to });
    }

    match to {
        Stage::Completed if state.final_response().is_none() => {
            Err(TransitionError::MissingFinalResponse)
        }
        Stage::Error if state.retry_count >= max_retries => {
            Err(TransitionError::RetryLimitReached {
                retry_count: state.retry_count,
                max_retries,
            })
        }
        _ => Ok(()),
    }
}
