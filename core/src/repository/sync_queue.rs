//! Sync queue store trait.

use crate::error::RepoResult;
use crate::ids::{SyncItemId, UserId};
use crate::model::SyncQueueItem;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Pending/failed item counts for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Items waiting or retrying.
    pub pending: u64,

    /// Items that exhausted their retries.
    pub failed: u64,
}

/// Persistence for [`SyncQueueItem`] rows.
pub trait SyncQueueStore: Send + Sync {
    /// Insert a new item.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn enqueue(
        &self,
        item: &SyncQueueItem,
    ) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Claim up to `limit` runnable items for `node_id`. Runnable means
    /// `status ∈ {pending, retrying}` and `next_retry_at ≤ now`; selection
    /// order is priority descending then `created_at` ascending. Claimed
    /// items move to `processing` with `processing_node = node_id` and
    /// `last_attempt_at = now`. *Atomic* — concurrent claimers never
    /// receive the same item.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn claim_pending(
        &self,
        node_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<Vec<SyncQueueItem>>> + Send;

    /// Mark an item completed.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn complete(
        &self,
        item_id: SyncItemId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Mark an item terminally failed.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn fail(
        &self,
        item_id: SyncItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Schedule another attempt: bump `retry_count`, set `status =
    /// retrying`, record the error and the next eligible instant.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn mark_for_retry(
        &self,
        item_id: SyncItemId,
        error: &str,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn get(&self, item_id: SyncItemId) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Replace a stored item wholesale (conflict resolution updates the
    /// embedded descriptor).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn update(
        &self,
        item: &SyncQueueItem,
    ) -> impl Future<Output = RepoResult<SyncQueueItem>> + Send;

    /// Pending/failed counts for a user.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn counts_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = RepoResult<QueueCounts>> + Send;

    /// Delete completed items finished before `older_than`; returns how
    /// many were removed.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn sweep_completed(
        &self,
        older_than: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<u64>> + Send;
}
