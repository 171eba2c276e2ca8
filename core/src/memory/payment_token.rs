//! In-memory payment token store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::ids::{PaymentTokenId, UserId};
use crate::model::{PaymentToken, PaymentTokenStatus};
use crate::repository::PaymentTokenStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected token map.
#[derive(Debug, Clone, Default)]
pub struct MemoryPaymentTokenStore {
    tokens: Arc<Mutex<HashMap<PaymentTokenId, PaymentToken>>>,
}

impl MemoryPaymentTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentTokenStore for MemoryPaymentTokenStore {
    async fn create(&self, token: &PaymentToken) -> RepoResult<PaymentToken> {
        let mut tokens = self.tokens.lock().map_err(|_| poisoned())?;
        tokens.insert(token.id, token.clone());
        tracing::debug!(token_id = %token.id, owner_id = %token.owner_id, "Stored payment token");
        Ok(token.clone())
    }

    async fn get(&self, token_id: PaymentTokenId) -> RepoResult<PaymentToken> {
        let tokens = self.tokens.lock().map_err(|_| poisoned())?;
        tokens.get(&token_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_for_owner(&self, owner_id: UserId) -> RepoResult<Vec<PaymentToken>> {
        let tokens = self.tokens.lock().map_err(|_| poisoned())?;
        let mut mine: Vec<PaymentToken> = tokens
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn mark_revoked(
        &self,
        token_id: PaymentTokenId,
        owner_id: UserId,
    ) -> RepoResult<PaymentToken> {
        let mut tokens = self.tokens.lock().map_err(|_| poisoned())?;
        let token = tokens.get_mut(&token_id).ok_or(RepoError::NotFound)?;
        if token.owner_id != owner_id {
            // Ownership mismatch is indistinguishable from absence.
            return Err(RepoError::NotFound);
        }
        token.status = PaymentTokenStatus::Revoked;
        token.updated_at = Utc::now();
        Ok(token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token(owner: UserId) -> PaymentToken {
        let now = Utc::now();
        PaymentToken {
            id: PaymentTokenId::new(),
            owner_id: owner,
            masked_last4: "4242".into(),
            brand: "visa".into(),
            encrypted_payload: vec![1, 2, 3],
            status: PaymentTokenStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_revoke_requires_ownership() {
        let store = MemoryPaymentTokenStore::new();
        let owner = UserId::new();
        let token = sample_token(owner);
        store.create(&token).await.unwrap();

        let err = store.mark_revoked(token.id, UserId::new()).await.unwrap_err();
        assert_eq!(err, RepoError::NotFound);

        let revoked = store.mark_revoked(token.id, owner).await.unwrap();
        assert_eq!(revoked.status, PaymentTokenStatus::Revoked);
    }
}
