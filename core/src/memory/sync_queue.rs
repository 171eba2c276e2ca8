//! In-memory sync queue store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::ids::{SyncItemId, UserId};
use crate::model::{SyncQueueItem, SyncQueueStatus};
use crate::repository::{QueueCounts, SyncQueueStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected queue. Claiming selects and flips items to
/// `processing` in one critical section, which is what keeps two claimers
/// from receiving the same item.
#[derive(Debug, Clone, Default)]
pub struct MemorySyncQueueStore {
    items: Arc<Mutex<HashMap<SyncItemId, SyncQueueItem>>>,
}

impl MemorySyncQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncQueueStore for MemorySyncQueueStore {
    async fn enqueue(&self, item: &SyncQueueItem) -> RepoResult<SyncQueueItem> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        items.insert(item.id, item.clone());
        tracing::debug!(item_id = %item.id, user_id = %item.user_id, "Enqueued sync item");
        Ok(item.clone())
    }

    async fn claim_pending(
        &self,
        node_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<SyncQueueItem>> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;

        let mut runnable: Vec<SyncItemId> = items
            .values()
            .filter(|i| {
                matches!(i.status, SyncQueueStatus::Pending | SyncQueueStatus::Retrying)
                    && i.next_retry_at <= now
            })
            .map(|i| i.id)
            .collect();
        runnable.sort_by(|a, b| {
            let ia = &items[a];
            let ib = &items[b];
            ib.priority
                .cmp(&ia.priority)
                .then(ia.created_at.cmp(&ib.created_at))
        });
        runnable.truncate(limit);

        let mut claimed = Vec::with_capacity(runnable.len());
        for id in runnable {
            if let Some(item) = items.get_mut(&id) {
                item.status = SyncQueueStatus::Processing;
                item.processing_node = Some(node_id.to_string());
                item.last_attempt_at = Some(now);
                item.updated_at = now;
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, item_id: SyncItemId, now: DateTime<Utc>) -> RepoResult<SyncQueueItem> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        let item = items.get_mut(&item_id).ok_or(RepoError::NotFound)?;
        item.status = SyncQueueStatus::Completed;
        item.completed_at = Some(now);
        item.processing_node = None;
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn fail(
        &self,
        item_id: SyncItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<SyncQueueItem> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        let item = items.get_mut(&item_id).ok_or(RepoError::NotFound)?;
        item.status = SyncQueueStatus::Failed;
        item.last_error = Some(error.to_string());
        item.processing_node = None;
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn mark_for_retry(
        &self,
        item_id: SyncItemId,
        error: &str,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepoResult<SyncQueueItem> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        let item = items.get_mut(&item_id).ok_or(RepoError::NotFound)?;
        item.status = SyncQueueStatus::Retrying;
        item.retry_count += 1;
        item.last_error = Some(error.to_string());
        item.next_retry_at = next_retry_at;
        item.processing_node = None;
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn get(&self, item_id: SyncItemId) -> RepoResult<SyncQueueItem> {
        let items = self.items.lock().map_err(|_| poisoned())?;
        items.get(&item_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update(&self, item: &SyncQueueItem) -> RepoResult<SyncQueueItem> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        if !items.contains_key(&item.id) {
            return Err(RepoError::NotFound);
        }
        let mut next = item.clone();
        next.updated_at = Utc::now();
        items.insert(next.id, next.clone());
        Ok(next)
    }

    async fn counts_for_user(&self, user_id: UserId) -> RepoResult<QueueCounts> {
        let items = self.items.lock().map_err(|_| poisoned())?;
        let mut counts = QueueCounts::default();
        for item in items.values().filter(|i| i.user_id == user_id) {
            match item.status {
                SyncQueueStatus::Pending | SyncQueueStatus::Retrying => counts.pending += 1,
                SyncQueueStatus::Failed => counts.failed += 1,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn sweep_completed(&self, older_than: DateTime<Utc>) -> RepoResult<u64> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        let before = items.len();
        items.retain(|_, i| {
            !(i.status == SyncQueueStatus::Completed
                && i.completed_at.is_some_and(|at| at < older_than))
        });
        Ok((before - items.len()) as u64)
    }
}
