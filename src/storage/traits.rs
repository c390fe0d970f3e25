//! Checkpoint store seam

use async_trait::async_trait;

use super::error::CheckpointResult;

/// Persists serialized pipeline states between stage hops
///
/// The executor stores the whole serialized state after every hop and loads
/// it back by session id to resume. At most one writer per session is
/// expected at a time; implementations need not arbitrate between writers.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store the latest checkpoint for a session, replacing any previous one
    async fn store(&self, session_id: &str, serialized_state: &str) -> CheckpointResult<()>;

    /// Load the latest checkpoint for a session
    async fn load(&self, session_id: &str) -> CheckpointResult<Option<String>>;

    /// Delete a session's checkpoint; deleting a missing one is not an error
    async fn delete(&self, session_id: &str) -> CheckpointResult<()>;

    /// Session ids with a stored checkpoint, sorted
    async fn list(&self) -> CheckpointResult<Vec<String>>;
}
