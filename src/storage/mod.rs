//! Checkpoint persistence
//!
//! The pipeline core only depends on the [`CheckpointStore`] trait; the
//! backends here are the in-process and on-disk implementations.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{FileCheckpointStore, MemoryCheckpointStore};
pub use error::{CheckpointError, CheckpointResult};
pub use traits::CheckpointStore;

use crate::config::PipelineConfig;
use std::sync::Arc;

/// Build the store described by the configuration, if checkpointing is enabled
pub fn store_from_config(config: &PipelineConfig) -> Option<Arc<dyn CheckpointStore>> {
    if !config.checkpoint.enabled {
        return None;
    }
    Some(Arc::new(FileCheckpointStore::new(config.checkpoint_dir())))
}
