//! Biometric unlock challenge/response.
//!
//! The server issues `(challenge, signature)` where the signature is
//! `HMAC-SHA256(biometric_secret, device_id ‖ ":" ‖ challenge)`. On
//! unlock the client echoes both back; the server recomputes the HMAC,
//! compares in constant time, and consumes the stored challenge so it can
//! never be replayed. What the device did biometrically to release the
//! signature is opaque to the server.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sokoni_core::ids::DeviceId;
use sokoni_core::SecretKey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

type HmacSha256 = Hmac<Sha256>;

/// A challenge handed to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricChallenge {
    /// 16 random bytes, base64-encoded.
    pub challenge: String,

    /// HMAC the client must echo back.
    pub signature: String,

    /// Instant the challenge stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Single-use challenge storage.
///
/// `consume` must be atomic: a challenge verifies exactly once even under
/// concurrent unlock attempts.
pub trait ChallengeStore: Send + Sync {
    /// Store a freshly issued challenge for a device.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn put(
        &self,
        device_id: &DeviceId,
        challenge: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically look up and delete a challenge, returning its expiry if
    /// it was present.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn consume(
        &self,
        device_id: &DeviceId,
        challenge: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;
}

/// Mutex-protected challenge map for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryChallengeStore {
    challenges: Arc<Mutex<HashMap<(String, String), DateTime<Utc>>>>,
}

impl MemoryChallengeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for MemoryChallengeStore {
    async fn put(
        &self,
        device_id: &DeviceId,
        challenge: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut challenges = self
            .challenges
            .lock()
            .map_err(|_| AuthError::Internal("challenge lock poisoned".into()))?;
        challenges.insert((device_id.0.clone(), challenge.to_string()), expires_at);
        Ok(())
    }

    async fn consume(
        &self,
        device_id: &DeviceId,
        challenge: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut challenges = self
            .challenges
            .lock()
            .map_err(|_| AuthError::Internal("challenge lock poisoned".into()))?;
        Ok(challenges.remove(&(device_id.0.clone(), challenge.to_string())))
    }
}

/// Generate a 16-byte base64 challenge.
#[must_use]
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Compute the challenge signature for a device.
#[must_use]
pub fn sign_challenge(secret: &SecretKey, device_id: &DeviceId, challenge: &str) -> String {
    // HMAC accepts any key length; 32 bytes never errors.
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(device_id.as_str().as_bytes());
    mac.update(b":");
    mac.update(challenge.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a presented signature against the expected
/// one.
#[must_use]
pub fn verify_signature(
    secret: &SecretKey,
    device_id: &DeviceId,
    challenge: &str,
    presented: &str,
) -> bool {
    let expected = sign_challenge(secret, device_id, challenge);
    constant_time_eq::constant_time_eq(expected.as_bytes(), presented.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let secret = SecretKey::generate();
        let device = DeviceId::new("device-1");
        let challenge = generate_challenge();
        let signature = sign_challenge(&secret, &device, &challenge);

        assert!(verify_signature(&secret, &device, &challenge, &signature));
        assert!(!verify_signature(&secret, &DeviceId::new("device-2"), &challenge, &signature));
        assert!(!verify_signature(&secret, &device, &generate_challenge(), &signature));
    }

    #[test]
    fn test_challenges_are_unique() {
        assert_ne!(generate_challenge(), generate_challenge());
    }

    #[tokio::test]
    async fn test_challenge_consumes_once() {
        let store = MemoryChallengeStore::new();
        let device = DeviceId::new("device-1");
        let expires = Utc::now() + chrono::Duration::minutes(5);
        store.put(&device, "chal", expires).await.unwrap();

        assert_eq!(store.consume(&device, "chal").await.unwrap(), Some(expires));
        assert_eq!(store.consume(&device, "chal").await.unwrap(), None);
    }
}
