//! In-memory ledger store.

use super::poisoned;
use crate::error::{RepoError, RepoResult};
use crate::ids::{EntryId, UserId};
use crate::model::{EntryStatus, EntryType, LedgerEntry};
use crate::money::Balances;
use crate::repository::{fold_balances, LedgerAppend, LedgerStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected append-only entry log with an idempotency index on
/// `(user, reference, type)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<EntryId, usize>,
    by_triple: HashMap<(UserId, String, EntryType), usize>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> RepoResult<LedgerAppend> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        if !entry.reference.is_empty() {
            let key = (entry.user_id, entry.reference.clone(), entry.entry_type);
            if let Some(&idx) = inner.by_triple.get(&key) {
                tracing::debug!(
                    user_id = %entry.user_id,
                    reference = %entry.reference,
                    "Ledger append deduplicated by idempotency triple"
                );
                return Ok(LedgerAppend {
                    entry: inner.entries[idx].clone(),
                    deduplicated: true,
                });
            }
        }
        let idx = inner.entries.len();
        inner.entries.push(entry.clone());
        inner.by_id.insert(entry.id, idx);
        if !entry.reference.is_empty() {
            inner
                .by_triple
                .insert((entry.user_id, entry.reference.clone(), entry.entry_type), idx);
        }
        Ok(LedgerAppend {
            entry: entry.clone(),
            deduplicated: false,
        })
    }

    async fn update_status(
        &self,
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
        provider_reference: Option<&str>,
    ) -> RepoResult<LedgerEntry> {
        if !from.can_transition_to(to) {
            return Err(RepoError::VersionConflict);
        }
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let idx = *inner.by_id.get(&entry_id).ok_or(RepoError::NotFound)?;
        let entry = &mut inner.entries[idx];
        if entry.status != from {
            return Err(RepoError::VersionConflict);
        }
        entry.status = to;
        if let Some(provider_ref) = provider_reference {
            entry.provider_reference = Some(provider_ref.to_string());
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn get(&self, entry_id: EntryId) -> RepoResult<LedgerEntry> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let idx = *inner.by_id.get(&entry_id).ok_or(RepoError::NotFound)?;
        Ok(inner.entries[idx].clone())
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<LedgerEntry>> {
        if reference.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner
            .entries
            .iter()
            .find(|e| e.reference == reference)
            .cloned())
    }

    async fn find_by_user_reference(
        &self,
        user_id: UserId,
        reference: &str,
        entry_type: EntryType,
    ) -> RepoResult<Option<LedgerEntry>> {
        if reference.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner
            .by_triple
            .get(&(user_id, reference.to_string(), entry_type))
            .map(|&idx| inner.entries[idx].clone()))
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> RepoResult<Vec<LedgerEntry>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let mut mine: Vec<LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit);
        Ok(mine)
    }

    async fn balances(&self, user_id: UserId, currency: &str) -> RepoResult<Balances> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(fold_balances(user_id, &inner.entries, currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryDirection;
    use crate::money::Money;

    fn pending_topup(user: UserId, amount: i64, reference: &str) -> LedgerEntry {
        let now = Utc::now();
        LedgerEntry {
            id: EntryId::new(),
            user_id: user,
            entry_type: EntryType::Topup,
            direction: EntryDirection::Credit,
            amount: Money::from_minor(amount),
            currency: "LRD".into(),
            status: EntryStatus::Pending,
            is_escrow: false,
            reference: reference.into(),
            provider_reference: None,
            description: "Mobile money topup".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_append_is_idempotent_on_triple() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new();
        let first = store.append(&pending_topup(user, 100, "ref-1")).await.unwrap();
        assert!(!first.deduplicated);

        let second = store.append(&pending_topup(user, 100, "ref-1")).await.unwrap();
        assert!(second.deduplicated);
        assert_eq!(second.entry.id, first.entry.id);
    }

    #[tokio::test]
    async fn test_empty_reference_never_deduplicates() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new();
        let a = store.append(&pending_topup(user, 100, "")).await.unwrap();
        let b = store.append(&pending_topup(user, 100, "")).await.unwrap();
        assert_ne!(a.entry.id, b.entry.id);
    }

    #[tokio::test]
    async fn test_status_transition_is_single_shot() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new();
        let appended = store.append(&pending_topup(user, 100, "ref-1")).await.unwrap();

        store
            .update_status(appended.entry.id, EntryStatus::Pending, EntryStatus::Completed, Some("mm-77"))
            .await
            .unwrap();

        // Already completed: the compare-and-set misses.
        let err = store
            .update_status(appended.entry.id, EntryStatus::Pending, EntryStatus::Failed, None)
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::VersionConflict);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected_up_front() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new();
        let appended = store.append(&pending_topup(user, 100, "ref-1")).await.unwrap();
        let err = store
            .update_status(appended.entry.id, EntryStatus::Completed, EntryStatus::Pending, None)
            .await
            .unwrap_err();
        assert_eq!(err, RepoError::VersionConflict);
    }

    #[tokio::test]
    async fn test_balances_follow_settlement() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new();
        let appended = store.append(&pending_topup(user, 100, "ref-1")).await.unwrap();

        let before = store.balances(user, "LRD").await.unwrap();
        assert_eq!(before.available, Money::ZERO);

        store
            .update_status(appended.entry.id, EntryStatus::Pending, EntryStatus::Completed, None)
            .await
            .unwrap();
        let after = store.balances(user, "LRD").await.unwrap();
        assert_eq!(after.available, Money::from_minor(100));
    }
}
