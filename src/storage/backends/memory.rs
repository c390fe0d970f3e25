//! In-memory checkpoint store for tests and single-process embedding

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{
    error::{validate_key, CheckpointResult},
    traits::CheckpointStore,
};

/// Checkpoints held in a shared map; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn store(&self, session_id: &str, serialized_state: &str) -> CheckpointResult<()> {
        validate_key(session_id)?;
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(session_id.to_string(), serialized_state.to_string());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> CheckpointResult<Option<String>> {
        validate_key(session_id)?;
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> CheckpointResult<()> {
        validate_key(session_id)?;
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(session_id);
        Ok(())
    }

    async fn list(&self) -> CheckpointResult<Vec<String>> {
        let checkpoints = self.checkpoints.read().await;
        let mut ids: Vec<String> = checkpoints.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
