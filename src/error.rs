use crate::core::transitions::TransitionError;
use crate::storage::CheckpointError;
use thiserror::Error;

/// Errors returned synchronously by the pipeline core.
///
/// Stage failures, quality-gate failures and exhausted retries are not
/// represented here: they are absorbed into a terminal `error` state.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Pipeline is missing the {0} stage")]
    MissingStage(&'static str),

    #[error("No checkpoint found for session {0}")]
    CheckpointNotFound(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
