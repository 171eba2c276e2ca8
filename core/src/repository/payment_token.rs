//! Payment token store trait.

use crate::error::RepoResult;
use crate::ids::{PaymentTokenId, UserId};
use crate::model::PaymentToken;
use std::future::Future;

/// Persistence for [`PaymentToken`] rows.
///
/// Rows carry only the AES-GCM envelope and display metadata — the store
/// never sees cleartext instrument data.
pub trait PaymentTokenStore: Send + Sync {
    /// Insert a new token.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn create(
        &self,
        token: &PaymentToken,
    ) -> impl Future<Output = RepoResult<PaymentToken>> + Send;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such token exists.
    fn get(
        &self,
        token_id: PaymentTokenId,
    ) -> impl Future<Output = RepoResult<PaymentToken>> + Send;

    /// List all tokens owned by `owner_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_for_owner(
        &self,
        owner_id: UserId,
    ) -> impl Future<Output = RepoResult<Vec<PaymentToken>>> + Send;

    /// Flip the token to revoked if it belongs to `owner_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the token does not exist or belongs to someone else
    /// (deliberately indistinguishable).
    fn mark_revoked(
        &self,
        token_id: PaymentTokenId,
        owner_id: UserId,
    ) -> impl Future<Output = RepoResult<PaymentToken>> + Send;
}
