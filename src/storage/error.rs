//! Error types for checkpoint stores

use std::fmt;
use thiserror::Error;

pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session id cannot be used as a storage key
    #[error("Invalid checkpoint key: {0}")]
    InvalidKey(String),

    #[error("Checkpoint error: {0}")]
    Other(#[from] anyhow::Error),
}

impl CheckpointError {
    pub fn invalid_key<E: fmt::Display>(key: E) -> Self {
        Self::InvalidKey(key.to_string())
    }
}

/// Reject keys that are empty or could escape a storage directory
pub fn validate_key(session_id: &str) -> CheckpointResult<()> {
    let escapes = session_id.contains(['/', '\\']) || session_id == "." || session_id == "..";
    if session_id.trim().is_empty() || escapes || session_id.contains('\0') {
        return Err(CheckpointError::invalid_key(format!("{:?}", session_id)));
    }
    Ok(())
}
