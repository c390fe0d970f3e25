//! Pure decision logic for the pipeline
//!
//! Nothing in this module performs I/O. Every function takes values and
//! returns values, so routing and transition rules can be tested without
//! stages, stores or a runtime.

pub mod router;
pub mod summary;
pub mod transitions;

pub use router::{route_after, route_from_error, RoutingDecision};
pub use summary::{summarize, RunOutcome, RunSummary};
pub use transitions::{is_valid, valid_transitions_from, validate_transition, TransitionError};
