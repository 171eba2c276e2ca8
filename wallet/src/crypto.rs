//! AES-256-GCM envelopes.
//!
//! Storage format is `nonce (12 bytes) ‖ ciphertext`; a fresh random nonce
//! is drawn per encryption, so the same plaintext never produces the same
//! envelope twice.

use crate::error::{Result, WalletError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use sokoni_core::ids::UserId;
use sokoni_core::SecretKey;
use std::sync::Arc;

/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Process-held AES-256-GCM cipher.
///
/// Cloning shares the keyed cipher; each `encrypt` call draws its own
/// nonce, so sharing is safe.
#[derive(Clone)]
pub struct Cipher {
    inner: Arc<Aes256Gcm>,
}

impl Cipher {
    /// Key a cipher from a 32-byte secret.
    #[must_use]
    pub fn new(key: &SecretKey) -> Self {
        // A 32-byte slice is by definition a valid AES-256 key.
        #[allow(clippy::unwrap_used)]
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).unwrap();
        Self {
            inner: Arc::new(cipher),
        }
    }

    /// Encrypt into a `nonce ‖ ciphertext` envelope.
    ///
    /// # Errors
    ///
    /// `EncryptionFailure` when the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .map_err(|_| WalletError::EncryptionFailure)?;
        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Open a `nonce ‖ ciphertext` envelope.
    ///
    /// # Errors
    ///
    /// `EncryptionFailure` on truncated envelopes or authentication
    /// failure.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        if envelope.len() <= NONCE_LEN {
            return Err(WalletError::EncryptionFailure);
        }
        let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
        let nonce = Nonce::clone_from_slice(nonce_bytes);
        self.inner
            .decrypt(&nonce, ciphertext)
            .map_err(|_| WalletError::EncryptionFailure)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(..)")
    }
}

/// SHA-256 hex of a user id — the mirror's row key, so the mirror is
/// joinable only by someone who already knows the user id.
#[must_use]
pub fn hashed_user_id(user_id: UserId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_uuid().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        use std::fmt::Write as _;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cipher = Cipher::new(&SecretKey::generate());
        let envelope = cipher.encrypt(b"amount=100;ref=top-1").unwrap();
        assert_eq!(cipher.decrypt(&envelope).unwrap(), b"amount=100;ref=top-1");
    }

    #[test]
    fn test_nonce_freshness() {
        let cipher = Cipher::new(&SecretKey::generate());
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let envelope = Cipher::new(&SecretKey::generate()).encrypt(b"secret").unwrap();
        let other = Cipher::new(&SecretKey::generate());
        assert_eq!(
            other.decrypt(&envelope).unwrap_err(),
            WalletError::EncryptionFailure
        );
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let cipher = Cipher::new(&SecretKey::generate());
        assert_eq!(
            cipher.decrypt(&[0u8; 5]).unwrap_err(),
            WalletError::EncryptionFailure
        );
    }

    #[test]
    fn test_user_hash_is_stable() {
        let user = UserId::new();
        assert_eq!(hashed_user_id(user), hashed_user_id(user));
        assert_ne!(hashed_user_id(user), hashed_user_id(UserId::new()));
    }
}
