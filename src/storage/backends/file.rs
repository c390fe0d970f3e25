//! File-based checkpoint store
//!
//! One `<session_id>.checkpoint.json` file per session. Writes go to a
//! temporary sibling first and are renamed into place, so a reader never
//! observes a half-written checkpoint.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::storage::{
    error::{validate_key, CheckpointResult},
    traits::CheckpointStore,
};

const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    storage_path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn checkpoint_path(&self, session_id: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}{}", session_id, CHECKPOINT_SUFFIX))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn store(&self, session_id: &str, serialized_state: &str) -> CheckpointResult<()> {
        validate_key(session_id)?;
        let checkpoint_path = self.checkpoint_path(session_id);
        let temp_path = checkpoint_path.with_extension("tmp");

        fs::create_dir_all(&self.storage_path)
            .await
            .context("Failed to create checkpoint directory")?;

        fs::write(&temp_path, serialized_state)
            .await
            .context("Failed to write checkpoint to temp file")?;

        fs::rename(&temp_path, &checkpoint_path)
            .await
            .context("Failed to move checkpoint to final location")?;

        debug!(
            session_id,
            path = %checkpoint_path.display(),
            "Stored checkpoint"
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> CheckpointResult<Option<String>> {
        validate_key(session_id)?;
        let checkpoint_path = self.checkpoint_path(session_id);

        match fs::read_to_string(&checkpoint_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, session_id: &str) -> CheckpointResult<()> {
        validate_key(session_id)?;
        match fs::remove_file(self.checkpoint_path(session_id)).await {
            Ok(()) => {
                debug!(session_id, "Deleted checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> CheckpointResult<Vec<String>> {
        let mut sessions = Vec::new();

        if !fs::try_exists(&self.storage_path).await? {
            return Ok(sessions);
        }

        let mut entries = fs::read_dir(&self.storage_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(session_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(CHECKPOINT_SUFFIX))
            {
                sessions.push(session_id.to_string());
            }
        }

        sessions.sort();
        Ok(sessions)
    }
}
