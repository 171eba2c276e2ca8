//! In-memory device session store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::ids::{DeviceId, SessionId, UserId};
use crate::model::DeviceSession;
use crate::repository::SessionStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected session map. The refresh-hash compare-and-set runs
/// entirely under the lock, which is what makes concurrent rotations on
/// one session serialize.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, DeviceSession>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &DeviceSession) -> RepoResult<DeviceSession> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.insert(session.id, session.clone());
        tracing::debug!(session_id = %session.id, user_id = %session.user_id, "Created session");
        Ok(session.clone())
    }

    async fn get(&self, session_id: SessionId) -> RepoResult<DeviceSession> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.get(&session_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_active_by_device(
        &self,
        device_id: &DeviceId,
    ) -> RepoResult<Option<DeviceSession>> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        Ok(sessions
            .values()
            .filter(|s| s.is_active && &s.device_id == device_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        session_id: SessionId,
        old_hash: &str,
        new_hash: &str,
    ) -> RepoResult<DeviceSession> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let session = sessions.get_mut(&session_id).ok_or(RepoError::NotFound)?;
        if !session.is_active {
            return Err(RepoError::NotFound);
        }
        match session.refresh_token_hash.as_deref() {
            Some(stored) if stored == old_hash => {
                session.refresh_token_hash = Some(new_hash.to_string());
                session.last_activity = Utc::now();
                Ok(session.clone())
            }
            _ => Err(RepoError::VersionConflict),
        }
    }

    async fn revoke(&self, session_id: SessionId) -> RepoResult<DeviceSession> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let session = sessions.get_mut(&session_id).ok_or(RepoError::NotFound)?;
        session.is_active = false;
        session.refresh_token_hash = None;
        session.revoked_at = Some(Utc::now());
        tracing::debug!(session_id = %session_id, "Revoked session");
        Ok(session.clone())
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> RepoResult<Vec<SessionId>> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let now = Utc::now();
        let mut revoked = Vec::new();
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                session.refresh_token_hash = None;
                session.revoked_at = Some(now);
                revoked.push(session.id);
            }
        }
        Ok(revoked)
    }

    async fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<DeviceSession>> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let mut mine: Vec<DeviceSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn touch(&self, session_id: SessionId, at: DateTime<Utc>) -> RepoResult<()> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let session = sessions.get_mut(&session_id).ok_or(RepoError::NotFound)?;
        session.last_activity = at;
        Ok(())
    }

    async fn set_biometric(
        &self,
        session_id: SessionId,
        biometric: Option<crate::model::BiometricType>,
    ) -> RepoResult<DeviceSession> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let session = sessions.get_mut(&session_id).ok_or(RepoError::NotFound)?;
        session.biometric_enabled = biometric.is_some();
        session.biometric_type = biometric;
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;

    fn sample_session(user_id: UserId, device: &str, hash: &str) -> DeviceSession {
        let now = Utc::now();
        DeviceSession {
            id: SessionId::new(),
            user_id,
            device_id: DeviceId::new(device),
            device_name: "Tecno Spark".into(),
            platform: Platform::Android,
            app_version: None,
            ip_address: "10.0.0.1".into(),
            user_agent: "okhttp/4.12".into(),
            refresh_token_hash: Some(hash.into()),
            is_active: true,
            biometric_enabled: false,
            biometric_type: None,
            last_activity: now,
            created_at: now,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_rotation_cas_single_winner() {
        let store = MemorySessionStore::new();
        let session = sample_session(UserId::new(), "dev-1", "hash-a");
        store.create(&session).await.unwrap();

        // First rotation presenting hash-a wins.
        store
            .rotate_refresh_token(session.id, "hash-a", "hash-b")
            .await
            .unwrap();

        // Second rotation with the stale hash loses the compare-and-set.
        let err = store
            .rotate_refresh_token(session.id, "hash-a", "hash-c")
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::VersionConflict);
    }

    #[tokio::test]
    async fn test_rotation_rejected_on_revoked_session() {
        let store = MemorySessionStore::new();
        let session = sample_session(UserId::new(), "dev-1", "hash-a");
        store.create(&session).await.unwrap();
        store.revoke(session.id).await.unwrap();

        let err = store
            .rotate_refresh_token(session.id, "hash-a", "hash-b")
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::NotFound);
    }

    #[tokio::test]
    async fn test_revoke_all_clears_hashes() {
        let store = MemorySessionStore::new();
        let user = UserId::new();
        let a = sample_session(user, "dev-1", "h1");
        let b = sample_session(user, "dev-2", "h2");
        let other = sample_session(UserId::new(), "dev-3", "h3");
        store.create(&a).await.unwrap();
        store.create(&b).await.unwrap();
        store.create(&other).await.unwrap();

        let revoked = store.revoke_all_for_user(user).await.unwrap();
        assert_eq!(revoked.len(), 2);

        let listed = store.list_for_user(user).await.unwrap();
        assert!(listed.iter().all(|s| !s.is_active && s.refresh_token_hash.is_none()));
        assert!(store.get(other.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_find_active_by_device_prefers_newest() {
        let store = MemorySessionStore::new();
        let user = UserId::new();
        let mut old = sample_session(user, "dev-1", "h1");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        let new = sample_session(user, "dev-1", "h2");
        store.create(&old).await.unwrap();
        store.create(&new).await.unwrap();

        let found = store
            .find_active_by_device(&DeviceId::new("dev-1"))
            .await
            .unwrap()
            .map(|s| s.id);
        assert_eq!(found, Some(new.id));
    }
}
