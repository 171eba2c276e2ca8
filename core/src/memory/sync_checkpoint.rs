//! In-memory checkpoint store.

use super::poisoned;
use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::SyncCheckpoint;
use crate::repository::CheckpointStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected map of the single active checkpoint per user.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    active: Arc<Mutex<HashMap<UserId, SyncCheckpoint>>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn put_active(&self, checkpoint: &SyncCheckpoint) -> RepoResult<SyncCheckpoint> {
        let mut active = self.active.lock().map_err(|_| poisoned())?;
        let mut next = checkpoint.clone();
        if let Some(prior) = active.get(&checkpoint.user_id) {
            next.version = prior.version + 1;
            next.created_at = prior.created_at;
        }
        next.updated_at = Utc::now();
        active.insert(next.user_id, next.clone());
        Ok(next)
    }

    async fn get_active(&self, user_id: UserId) -> RepoResult<Option<SyncCheckpoint>> {
        let active = self.active.lock().map_err(|_| poisoned())?;
        Ok(active.get(&user_id).cloned())
    }

    async fn delete_for_user(&self, user_id: UserId) -> RepoResult<()> {
        let mut active = self.active.lock().map_err(|_| poisoned())?;
        active.remove(&user_id);
        Ok(())
    }
}
