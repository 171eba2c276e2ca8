//! In-memory OTP store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::model::{normalize_email, OtpPurpose, OtpRecord};
use crate::repository::OtpStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected OTP records keyed by email. Consumption is a
/// check-and-stamp under the lock, so one code verifies exactly once.
#[derive(Debug, Clone, Default)]
pub struct MemoryOtpStore {
    records: Arc<Mutex<HashMap<String, Vec<OtpRecord>>>>,
}

impl MemoryOtpStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent record for an email, regardless of state. Test helper
    /// standing in for the out-of-band delivery channel.
    #[must_use]
    pub fn latest_for(&self, email: &str) -> Option<OtpRecord> {
        let records = self.records.lock().ok()?;
        records
            .get(&normalize_email(email))?
            .iter()
            .max_by_key(|r| r.created_at)
            .cloned()
    }
}

impl OtpStore for MemoryOtpStore {
    async fn create(&self, otp: &OtpRecord) -> RepoResult<OtpRecord> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let mut stored = otp.clone();
        stored.email = normalize_email(&stored.email);
        records
            .entry(stored.email.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn consume(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> RepoResult<OtpRecord> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let bucket = records
            .get_mut(&normalize_email(email))
            .ok_or(RepoError::NotFound)?;
        let candidate = bucket
            .iter_mut()
            .filter(|r| r.code == code && r.purpose == purpose && r.is_usable(now))
            .max_by_key(|r| r.created_at)
            .ok_or(RepoError::NotFound)?;
        candidate.used_at = Some(now);
        Ok(candidate.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn otp(email: &str, code: &str, ttl_minutes: i64) -> OtpRecord {
        let now = Utc::now();
        OtpRecord {
            email: email.into(),
            code: code.into(),
            purpose: OtpPurpose::PasswordReset,
            expires_at: now + chrono::Duration::minutes(ttl_minutes),
            used_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = MemoryOtpStore::new();
        store.create(&otp("a@x.com", "123456", 15)).await.unwrap();

        let now = Utc::now();
        store
            .consume("a@x.com", "123456", OtpPurpose::PasswordReset, now)
            .await
            .unwrap();
        let err = store
            .consume("a@x.com", "123456", OtpPurpose::PasswordReset, now)
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::NotFound);
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let store = MemoryOtpStore::new();
        store.create(&otp("a@x.com", "123456", -1)).await.unwrap();
        let err = store
            .consume("a@x.com", "123456", OtpPurpose::PasswordReset, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::NotFound);
    }

    #[tokio::test]
    async fn test_purpose_must_match() {
        let store = MemoryOtpStore::new();
        store.create(&otp("a@x.com", "123456", 15)).await.unwrap();
        let err = store
            .consume("a@x.com", "123456", OtpPurpose::Verification, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::NotFound);
    }
}
