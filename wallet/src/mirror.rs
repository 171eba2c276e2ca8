//! Encrypted system-of-record mirror.
//!
//! Every ledger entry is mirrored into a second collection whose
//! sensitive fields (amount, reference, provider reference) are sealed in
//! an AES-GCM envelope and whose row key is the SHA-256 of the user id.
//! Compliance export reads from here; balances never do — the primary
//! ledger stays authoritative.

use crate::crypto::{hashed_user_id, Cipher};
use crate::error::{Result, WalletError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokoni_core::ids::{EntryId, UserId};
use sokoni_core::model::LedgerEntry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Sensitive fields sealed into the envelope.
#[derive(Debug, Serialize, Deserialize)]
struct SealedFields {
    amount_minor: i64,
    reference: String,
    provider_reference: Option<String>,
}

/// One mirror row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    /// SHA-256 hex of the owning user id.
    pub user_hash: String,

    /// Mirrored entry id.
    pub entry_id: EntryId,

    /// Entry type tag, kept cleartext for filtering.
    pub entry_type: String,

    /// Entry status tag at mirror time.
    pub status: String,

    /// AES-GCM envelope of the sensitive fields.
    pub ciphertext: Vec<u8>,

    /// Mirror timestamp.
    pub created_at: DateTime<Utc>,
}

/// A decrypted export row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorExport {
    /// Mirrored entry id.
    pub entry_id: EntryId,

    /// Entry type tag.
    pub entry_type: String,

    /// Entry status tag at mirror time.
    pub status: String,

    /// Amount in minor units.
    pub amount_minor: i64,

    /// External reference.
    pub reference: String,

    /// Provider reference, when reported.
    pub provider_reference: Option<String>,
}

/// Storage for mirror rows.
pub trait MirrorStore: Send + Sync {
    /// Append one row (mirror rows are append-only like the ledger; a
    /// status change appends a new row).
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn put(&self, record: &MirrorRecord) -> impl Future<Output = Result<()>> + Send;

    /// All rows for a user hash, oldest first.
    ///
    /// # Errors
    ///
    /// Backing-store failures.
    fn list_for_hash(
        &self,
        user_hash: &str,
    ) -> impl Future<Output = Result<Vec<MirrorRecord>>> + Send;
}

/// Mutex-protected mirror for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryMirrorStore {
    rows: Arc<Mutex<HashMap<String, Vec<MirrorRecord>>>>,
}

impl MemoryMirrorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MirrorStore for MemoryMirrorStore {
    async fn put(&self, record: &MirrorRecord) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| WalletError::Internal("mirror lock poisoned".into()))?;
        rows.entry(record.user_hash.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_for_hash(&self, user_hash: &str) -> Result<Vec<MirrorRecord>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| WalletError::Internal("mirror lock poisoned".into()))?;
        Ok(rows.get(user_hash).cloned().unwrap_or_default())
    }
}

/// Sealing and export over a [`MirrorStore`].
#[derive(Clone)]
pub struct LedgerMirror<S: MirrorStore + Clone> {
    store: S,
    cipher: Cipher,
}

impl<S: MirrorStore + Clone> LedgerMirror<S> {
    /// Wire the mirror.
    pub const fn new(store: S, cipher: Cipher) -> Self {
        Self { store, cipher }
    }

    /// Seal and append one ledger entry.
    ///
    /// # Errors
    ///
    /// `EncryptionFailure` (the entry is NOT written in the clear) or
    /// store failures.
    pub async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let sealed = SealedFields {
            amount_minor: entry.amount.minor(),
            reference: entry.reference.clone(),
            provider_reference: entry.provider_reference.clone(),
        };
        let plaintext = serde_json::to_vec(&sealed)
            .map_err(|e| WalletError::Internal(format!("serialize mirror row: {e}")))?;
        let ciphertext = self.cipher.encrypt(&plaintext)?;
        self.store
            .put(&MirrorRecord {
                user_hash: hashed_user_id(entry.user_id),
                entry_id: entry.id,
                entry_type: entry.entry_type.as_str().to_string(),
                status: status_tag(entry),
                ciphertext,
                created_at: Utc::now(),
            })
            .await
    }

    /// Decrypt every mirrored row for a user (compliance export path).
    ///
    /// # Errors
    ///
    /// `EncryptionFailure` on any undecryptable row.
    pub async fn export(&self, user_id: UserId) -> Result<Vec<MirrorExport>> {
        let rows = self.store.list_for_hash(&hashed_user_id(user_id)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let plaintext = self.cipher.decrypt(&row.ciphertext)?;
            let sealed: SealedFields = serde_json::from_slice(&plaintext)
                .map_err(|e| WalletError::Internal(format!("deserialize mirror row: {e}")))?;
            out.push(MirrorExport {
                entry_id: row.entry_id,
                entry_type: row.entry_type,
                status: row.status,
                amount_minor: sealed.amount_minor,
                reference: sealed.reference,
                provider_reference: sealed.provider_reference,
            });
        }
        Ok(out)
    }
}

fn status_tag(entry: &LedgerEntry) -> String {
    match entry.status {
        sokoni_core::model::EntryStatus::Pending => "pending",
        sokoni_core::model::EntryStatus::Completed => "completed",
        sokoni_core::model::EntryStatus::Failed => "failed",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sokoni_core::model::{EntryDirection, EntryStatus, EntryType};
    use sokoni_core::{Money, SecretKey};

    fn entry(user: UserId) -> LedgerEntry {
        let now = Utc::now();
        LedgerEntry {
            id: EntryId::new(),
            user_id: user,
            entry_type: EntryType::Topup,
            direction: EntryDirection::Credit,
            amount: Money::from_minor(750),
            currency: "LRD".into(),
            status: EntryStatus::Pending,
            is_escrow: false,
            reference: "top-secret-ref".into(),
            provider_reference: Some("mm-123".into()),
            description: "topup".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_mirror_roundtrip() {
        let store = MemoryMirrorStore::new();
        let mirror = LedgerMirror::new(store.clone(), Cipher::new(&SecretKey::generate()));
        let user = UserId::new();
        let e = entry(user);
        mirror.record(&e).await.unwrap();

        let export = mirror.export(user).await.unwrap();
        assert_eq!(export.len(), 1);
        assert_eq!(export[0].amount_minor, 750);
        assert_eq!(export[0].reference, "top-secret-ref");

        // At rest, the sensitive fields are not readable.
        let raw = store.list_for_hash(&hashed_user_id(user)).await.unwrap();
        let at_rest = String::from_utf8_lossy(&raw[0].ciphertext).into_owned();
        assert!(!at_rest.contains("top-secret-ref"));
        assert!(!at_rest.contains("750"));
    }

    #[tokio::test]
    async fn test_export_is_per_user() {
        let mirror = LedgerMirror::new(MemoryMirrorStore::new(), Cipher::new(&SecretKey::generate()));
        let alice = UserId::new();
        let bob = UserId::new();
        mirror.record(&entry(alice)).await.unwrap();

        assert_eq!(mirror.export(alice).await.unwrap().len(), 1);
        assert!(mirror.export(bob).await.unwrap().is_empty());
    }
}
