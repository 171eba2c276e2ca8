//! Device session store trait.

use crate::error::RepoResult;
use crate::ids::{DeviceId, SessionId, UserId};
use crate::model::{BiometricType, DeviceSession};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Persistence for [`DeviceSession`] rows.
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn create(
        &self,
        session: &DeviceSession,
    ) -> impl Future<Output = RepoResult<DeviceSession>> + Send;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such session exists.
    fn get(&self, session_id: SessionId) -> impl Future<Output = RepoResult<DeviceSession>> + Send;

    /// Find the active session for a device, if any.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn find_active_by_device(
        &self,
        device_id: &DeviceId,
    ) -> impl Future<Output = RepoResult<Option<DeviceSession>>> + Send;

    /// Swap the stored refresh-token hash from `old_hash` to `new_hash` in
    /// one compare-and-set. *Atomic* — this is the single-use guarantee
    /// behind refresh rotation: of two concurrent refreshes presenting the
    /// same token, exactly one wins.
    ///
    /// # Errors
    ///
    /// `VersionConflict` when the stored hash is not `old_hash` (the token
    /// was already rotated or the session revoked); `NotFound` when the
    /// session is missing or inactive.
    fn rotate_refresh_token(
        &self,
        session_id: SessionId,
        old_hash: &str,
        new_hash: &str,
    ) -> impl Future<Output = RepoResult<DeviceSession>> + Send;

    /// Deactivate a session: `is_active = false`, clear the refresh hash,
    /// stamp `revoked_at`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such session exists.
    fn revoke(&self, session_id: SessionId) -> impl Future<Output = RepoResult<DeviceSession>> + Send;

    /// Deactivate every session belonging to `user_id`; returns the ids of
    /// the sessions that were active.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn revoke_all_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = RepoResult<Vec<SessionId>>> + Send;

    /// List all sessions (active and revoked) for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = RepoResult<Vec<DeviceSession>>> + Send;

    /// Bump `last_activity`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such session exists.
    fn touch(
        &self,
        session_id: SessionId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<()>> + Send;

    /// Enable (`Some(kind)`) or disable (`None`) biometric unlock for a
    /// session.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such session exists.
    fn set_biometric(
        &self,
        session_id: SessionId,
        biometric: Option<BiometricType>,
    ) -> impl Future<Output = RepoResult<DeviceSession>> + Send;
}
