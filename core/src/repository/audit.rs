//! Audit store trait.

use crate::audit::{AuditAction, AuditEntry, AuditResource};
use crate::error::RepoResult;
use crate::ids::UserId;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Persistence for [`AuditEntry`] rows. Append-only: no update or delete
/// operations exist on this trait by design of the trail.
pub trait AuditStore: Send + Sync {
    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures (callers going through
    /// [`AuditRecorder`](crate::audit::AuditRecorder) swallow them).
    fn append(&self, entry: &AuditEntry) -> impl Future<Output = RepoResult<()>> + Send;

    /// Entries whose actor is `user_id`, timestamp-descending, starting
    /// before `before` when given.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RepoResult<Vec<AuditEntry>>> + Send;

    /// Entries with a given action tag, timestamp-descending.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_by_action(
        &self,
        action: AuditAction,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RepoResult<Vec<AuditEntry>>> + Send;

    /// Entries touching a given resource, timestamp-descending.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_by_resource(
        &self,
        resource: AuditResource,
        resource_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RepoResult<Vec<AuditEntry>>> + Send;
}
