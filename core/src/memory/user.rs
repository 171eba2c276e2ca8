//! In-memory user store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::ids::UserId;
use crate::model::{normalize_email, User};
use crate::money::Money;
use crate::repository::UserStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected user map keyed by id, with an email index.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> RepoResult<User> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let email = normalize_email(&user.email);
        if inner.by_email.contains_key(&email) {
            return Err(RepoError::UniqueViolation);
        }
        let mut stored = user.clone();
        stored.email = email.clone();
        inner.by_email.insert(email, stored.id);
        inner.users.insert(stored.id, stored.clone());
        tracing::debug!(user_id = %stored.id, "Created user");
        Ok(stored)
    }

    async fn get(&self, user_id: UserId) -> RepoResult<User> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.users.get(&user_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<User> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let id = inner
            .by_email
            .get(&normalize_email(email))
            .ok_or(RepoError::NotFound)?;
        let user = inner.users.get(id).cloned().ok_or(RepoError::NotFound)?;
        if user.is_deleted() {
            return Err(RepoError::NotFound);
        }
        Ok(user)
    }

    async fn update(&self, user: &User) -> RepoResult<User> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let stored = inner.users.get_mut(&user.id).ok_or(RepoError::NotFound)?;
        if stored.version != user.version {
            return Err(RepoError::VersionConflict);
        }
        let mut next = user.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn update_password(
        &self,
        user_id: UserId,
        new_hash: &str,
        expected_version: u64,
    ) -> RepoResult<User> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let stored = inner.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepoError::VersionConflict);
        }
        stored.password_hash = new_hash.to_string();
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn set_wallet_snapshot(
        &self,
        user_id: UserId,
        balance: Money,
        currency: &str,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let stored = inner.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        stored.wallet_balance = balance;
        stored.wallet_currency = currency.to_string();
        if let Some(at) = last_sync_at {
            stored.last_sync_at = Some(at);
        }
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn set_sync_state(
        &self,
        user_id: UserId,
        last_sync_at: DateTime<Utc>,
        is_offline: bool,
    ) -> RepoResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let stored = inner.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        stored.last_sync_at = Some(last_sync_at);
        stored.is_offline = is_offline;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, user_id: UserId) -> RepoResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let stored = inner.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        stored.deleted_at = Some(Utc::now());
        stored.updated_at = Utc::now();
        Ok(())
    }
}
