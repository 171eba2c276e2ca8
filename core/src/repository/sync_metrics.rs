//! Sync metrics store trait.

use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::SyncMetrics;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Persistence for [`SyncMetrics`] rows. Retention is 30 days; durable
/// stores use a TTL index, the in-memory store relies on [`Self::sweep`].
pub trait SyncMetricsStore: Send + Sync {
    /// Record one sync attempt.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn record(&self, metrics: &SyncMetrics) -> impl Future<Output = RepoResult<()>> + Send;

    /// List a user's most recent attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = RepoResult<Vec<SyncMetrics>>> + Send;

    /// Delete rows recorded before `older_than`; returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn sweep(&self, older_than: DateTime<Utc>) -> impl Future<Output = RepoResult<u64>> + Send;
}
