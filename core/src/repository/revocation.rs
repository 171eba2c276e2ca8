//! Revocation list trait.

use crate::error::RepoResult;
use std::future::Future;
use std::time::Duration;

/// TTL-indexed blacklist of token ids (`jti`) and session ids.
///
/// Read on every access-token validation, written on logout and rotation,
/// so implementations must expire entries automatically to bound their
/// size. Entries only need to outlive the token they blacklist; the TTL
/// passed at revocation time is the token's remaining life.
pub trait RevocationStore: Send + Sync {
    /// Blacklist `key` for `ttl`. Revoking an already-revoked key extends
    /// the TTL if the new one is longer.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn revoke(&self, key: &str, ttl: Duration) -> impl Future<Output = RepoResult<()>> + Send;

    /// `true` while `key` is blacklisted.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn is_revoked(&self, key: &str) -> impl Future<Output = RepoResult<bool>> + Send;
}
