//! Sync checkpoint store trait.

use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::SyncCheckpoint;
use std::future::Future;

/// Persistence for [`SyncCheckpoint`] rows.
///
/// At most one active checkpoint per user; `put_active` supersedes any
/// prior active row.
pub trait CheckpointStore: Send + Sync {
    /// Upsert the active checkpoint for `checkpoint.user_id`, bumping its
    /// version. *Atomic per user.*
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn put_active(
        &self,
        checkpoint: &SyncCheckpoint,
    ) -> impl Future<Output = RepoResult<SyncCheckpoint>> + Send;

    /// Fetch the active checkpoint, if the user has one.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn get_active(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = RepoResult<Option<SyncCheckpoint>>> + Send;

    /// Drop the user's active checkpoint (a full re-sync follows).
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn delete_for_user(&self, user_id: UserId) -> impl Future<Output = RepoResult<()>> + Send;
}
