//! In-memory revocation list.

use super::poisoned;
use crate::error::RepoResult;
use crate::repository::RevocationStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Mutex-protected blacklist with lazy TTL expiry.
///
/// Expired keys are dropped on the read path and opportunistically on
/// writes; production deployments use the Redis store, whose TTL handling
/// is native.
#[derive(Debug, Clone, Default)]
pub struct MemoryRevocationStore {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl MemoryRevocationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, key: &str, ttl: Duration) -> RepoResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let now = Instant::now();
        entries.retain(|_, expiry| *expiry > now);
        let expiry = now + ttl;
        entries
            .entry(key.to_string())
            .and_modify(|e| {
                if expiry > *e {
                    *e = expiry;
                }
            })
            .or_insert(expiry);
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Revoked key");
        Ok(())
    }

    async fn is_revoked(&self, key: &str) -> RepoResult<bool> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .is_some_and(|expiry| *expiry > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revoked_until_ttl_elapses() {
        let store = MemoryRevocationStore::new();
        store.revoke("jti-1", Duration::from_millis(50)).await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!store.is_revoked("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_re_revoke_extends_ttl() {
        let store = MemoryRevocationStore::new();
        store.revoke("sid-1", Duration::from_millis(30)).await.unwrap();
        store.revoke("sid-1", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_revoked("sid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_key_not_revoked() {
        let store = MemoryRevocationStore::new();
        assert!(!store.is_revoked("never-seen").await.unwrap());
    }
}
