//! User store trait.

use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::User;
use crate::money::Money;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Persistence for [`User`] rows.
///
/// Emails are unique after normalization; `create` fails with
/// `UniqueViolation` on a duplicate. All updates are optimistic: the write
/// must present the version it read or fail with `VersionConflict`.
pub trait UserStore: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// `UniqueViolation` when the normalized email is already registered.
    fn create(&self, user: &User) -> impl Future<Output = RepoResult<User>> + Send;

    /// Fetch by id. Soft-deleted users are still returned.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such user exists.
    fn get(&self, user_id: UserId) -> impl Future<Output = RepoResult<User>> + Send;

    /// Fetch by normalized email. Soft-deleted users are invisible here.
    ///
    /// # Errors
    ///
    /// `NotFound` when no live user has the address.
    fn get_by_email(&self, email: &str) -> impl Future<Output = RepoResult<User>> + Send;

    /// Replace the full row if `user.version` matches the stored version;
    /// the stored version is bumped. *Atomic.*
    ///
    /// # Errors
    ///
    /// `VersionConflict` when the stored version differs.
    fn update(&self, user: &User) -> impl Future<Output = RepoResult<User>> + Send;

    /// Swap the password hash if the version matches. *Atomic.*
    ///
    /// # Errors
    ///
    /// `NotFound` / `VersionConflict`.
    fn update_password(
        &self,
        user_id: UserId,
        new_hash: &str,
        expected_version: u64,
    ) -> impl Future<Output = RepoResult<User>> + Send;

    /// Refresh the cached wallet projection and optionally `last_sync_at`.
    /// Not version-checked: the projection is derived state.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such user exists.
    fn set_wallet_snapshot(
        &self,
        user_id: UserId,
        balance: Money,
        currency: &str,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RepoResult<()>> + Send;

    /// Record sync progress: `last_sync_at` and the client-reported
    /// offline flag. Not version-checked: derived state.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such user exists.
    fn set_sync_state(
        &self,
        user_id: UserId,
        last_sync_at: DateTime<Utc>,
        is_offline: bool,
    ) -> impl Future<Output = RepoResult<()>> + Send;

    /// Soft-delete: stamp `deleted_at`, hiding the account from email
    /// lookups while keeping the row for audit.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such user exists.
    fn soft_delete(&self, user_id: UserId) -> impl Future<Output = RepoResult<()>> + Send;
}
