//! Redis-backed revocation list.
//!
//! Revoked `jti`s and session ids are keys with a TTL equal to the
//! remaining token life, so the list stays bounded without any sweeper:
//! Redis expiry is the purge.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use sokoni_core::repository::RevocationStore;
use sokoni_core::{RepoError, RepoResult};
use std::time::Duration;

/// Redis revocation list.
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn_manager: ConnectionManager,
}

impl RedisRevocationStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// `TransientIo` when the connection cannot be established.
    pub async fn new(redis_url: &str) -> RepoResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| RepoError::TransientIo(format!("redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| RepoError::TransientIo(format!("redis connect: {e}")))?;
        Ok(Self { conn_manager })
    }

    fn revocation_key(key: &str) -> String {
        format!("revoked:{key}")
    }
}

impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, key: &str, ttl: Duration) -> RepoResult<()> {
        let mut conn = self.conn_manager.clone();
        let redis_key = Self::revocation_key(key);
        let new_ttl = ttl.as_secs().max(1);

        // Keep the longer expiry when the key is revoked twice.
        let current_ttl: i64 = conn
            .ttl(&redis_key)
            .await
            .map_err(|e| RepoError::TransientIo(format!("redis ttl: {e}")))?;
        let effective = if current_ttl > 0 {
            new_ttl.max(current_ttl as u64)
        } else {
            new_ttl
        };

        let _: () = conn
            .set_ex(&redis_key, 1u8, effective)
            .await
            .map_err(|e| RepoError::TransientIo(format!("redis revoke: {e}")))?;

        tracing::debug!(key = %key, ttl_secs = effective, "Revoked key in Redis");
        Ok(())
    }

    async fn is_revoked(&self, key: &str) -> RepoResult<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::revocation_key(key))
            .await
            .map_err(|e| RepoError::TransientIo(format!("redis exists: {e}")))
    }
}
