//! Ledger store trait and the balance fold.

use crate::error::RepoResult;
use crate::ids::{EntryId, UserId};
use crate::model::{EntryStatus, EntryType, LedgerEntry};
use crate::money::{Balances, Money};
use std::future::Future;

/// Result of an append: the row now in the ledger, and whether it was
/// created by this call or found via the idempotency constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerAppend {
    /// The ledger row — freshly inserted, or the pre-existing row with the
    /// same `(user, reference, type)` triple.
    pub entry: LedgerEntry,

    /// `true` when the idempotency constraint matched a prior row.
    pub deduplicated: bool,
}

/// Persistence for [`LedgerEntry`] rows.
pub trait LedgerStore: Send + Sync {
    /// Append an entry, enforcing the idempotency invariant: when
    /// `entry.reference` is non-empty and a row with the same
    /// `(user_id, reference, entry_type)` already exists, that row is
    /// returned with `deduplicated = true` and nothing is written.
    /// *Atomic* — two concurrent appends with the same triple yield one
    /// row.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn append(&self, entry: &LedgerEntry)
    -> impl Future<Output = RepoResult<LedgerAppend>> + Send;

    /// Transition `entry_id` from `from` to `to`, recording the provider
    /// reference when given. Only `pending → completed` and
    /// `pending → failed` are legal. *Atomic.*
    ///
    /// # Errors
    ///
    /// `VersionConflict` when the stored status is not `from` or the
    /// transition is illegal; `NotFound` for unknown ids.
    fn update_status(
        &self,
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
        provider_reference: Option<&str>,
    ) -> impl Future<Output = RepoResult<LedgerEntry>> + Send;

    /// Fetch by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    fn get(&self, entry_id: EntryId) -> impl Future<Output = RepoResult<LedgerEntry>> + Send;

    /// Find the entry carrying an external reference, regardless of user.
    /// Webhooks only know the reference.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn find_by_reference(
        &self,
        reference: &str,
    ) -> impl Future<Output = RepoResult<Option<LedgerEntry>>> + Send;

    /// Find the entry for one `(user, reference, type)` triple — the
    /// idempotency key's unique row, when it exists.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn find_by_user_reference(
        &self,
        user_id: UserId,
        reference: &str,
        entry_type: EntryType,
    ) -> impl Future<Output = RepoResult<Option<LedgerEntry>>> + Send;

    /// List a user's entries, newest first, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn list_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = RepoResult<Vec<LedgerEntry>>> + Send;

    /// Compute the balance fold for a user (see [`fold_balances`]).
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn balances(
        &self,
        user_id: UserId,
        currency: &str,
    ) -> impl Future<Output = RepoResult<Balances>> + Send;
}

/// Fold a user's entries into their balance projection.
///
/// `available = Σ completed non-escrow credits − Σ completed non-escrow
/// debits − Σ open escrow holds`; `pending_held = Σ open escrow holds`.
///
/// An escrow hold is *open* until a closing entry with the same reference
/// appears for the same user: a `payment` debit (escrow completed against
/// the payer) or an escrow-flagged `escrow_release` credit (cancellation
/// refund). The recipient's release is a plain completed credit and never
/// touches the payer's fold.
#[must_use]
pub fn fold_balances(user_id: UserId, entries: &[LedgerEntry], currency: &str) -> Balances {
    let mine: Vec<&LedgerEntry> = entries.iter().filter(|e| e.user_id == user_id).collect();

    let mut available = Money::ZERO;
    for entry in &mine {
        if !entry.counts_toward_available() {
            continue;
        }
        match entry.direction {
            crate::model::EntryDirection::Credit => {
                available = available.saturating_add(entry.amount);
            }
            crate::model::EntryDirection::Debit => {
                available = available.saturating_sub(entry.amount);
            }
        }
    }

    let mut pending_held = Money::ZERO;
    for entry in &mine {
        if !entry.is_escrow_hold() {
            continue;
        }
        let closed = !entry.reference.is_empty()
            && mine.iter().any(|other| {
                other.reference == entry.reference
                    && other.status == EntryStatus::Completed
                    && (other.entry_type == EntryType::Payment
                        || (other.entry_type == EntryType::EscrowRelease && other.is_escrow))
            });
        if !closed {
            pending_held = pending_held.saturating_add(entry.amount);
        }
    }

    available = available.saturating_sub(pending_held);

    Balances {
        available,
        pending_held,
        total: available.saturating_add(pending_held),
        currency: currency.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryDirection;
    use chrono::Utc;

    fn entry(
        user: UserId,
        entry_type: EntryType,
        direction: EntryDirection,
        amount: i64,
        status: EntryStatus,
        is_escrow: bool,
        reference: &str,
    ) -> LedgerEntry {
        let now = Utc::now();
        LedgerEntry {
            id: EntryId::new(),
            user_id: user,
            entry_type,
            direction,
            amount: Money::from_minor(amount),
            currency: "LRD".into(),
            status,
            is_escrow,
            reference: reference.into(),
            provider_reference: None,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fold_counts_only_completed_non_escrow() {
        let user = UserId::new();
        let entries = vec![
            entry(user, EntryType::Topup, EntryDirection::Credit, 100, EntryStatus::Completed, false, "r1"),
            entry(user, EntryType::Topup, EntryDirection::Credit, 50, EntryStatus::Pending, false, "r2"),
            entry(user, EntryType::Withdraw, EntryDirection::Debit, 30, EntryStatus::Failed, false, "r3"),
        ];
        let b = fold_balances(user, &entries, "LRD");
        assert_eq!(b.available, Money::from_minor(100));
        assert_eq!(b.pending_held, Money::ZERO);
    }

    #[test]
    fn test_fold_open_hold_moves_available_to_held() {
        let user = UserId::new();
        let entries = vec![
            entry(user, EntryType::Topup, EntryDirection::Credit, 500, EntryStatus::Completed, false, "t1"),
            entry(user, EntryType::EscrowHold, EntryDirection::Debit, 200, EntryStatus::Completed, true, "ord-9"),
        ];
        let b = fold_balances(user, &entries, "LRD");
        assert_eq!(b.available, Money::from_minor(300));
        assert_eq!(b.pending_held, Money::from_minor(200));
        assert_eq!(b.total, Money::from_minor(500));
    }

    #[test]
    fn test_fold_cancelled_hold_restores_available() {
        let user = UserId::new();
        let entries = vec![
            entry(user, EntryType::Topup, EntryDirection::Credit, 500, EntryStatus::Completed, false, "t1"),
            entry(user, EntryType::EscrowHold, EntryDirection::Debit, 200, EntryStatus::Completed, true, "ord-9"),
            // Cancellation refund: escrow-flagged release back to the payer.
            entry(user, EntryType::EscrowRelease, EntryDirection::Credit, 200, EntryStatus::Completed, true, "ord-9"),
        ];
        let b = fold_balances(user, &entries, "LRD");
        assert_eq!(b.available, Money::from_minor(500));
        assert_eq!(b.pending_held, Money::ZERO);
    }

    #[test]
    fn test_fold_completed_escrow_settles_against_payer() {
        let payer = UserId::new();
        let recipient = UserId::new();
        let entries = vec![
            entry(payer, EntryType::Topup, EntryDirection::Credit, 500, EntryStatus::Completed, false, "t1"),
            entry(payer, EntryType::EscrowHold, EntryDirection::Debit, 200, EntryStatus::Completed, true, "ord-9"),
            // Completion: payer settles with a plain payment debit...
            entry(payer, EntryType::Payment, EntryDirection::Debit, 200, EntryStatus::Completed, false, "ord-9"),
            // ...and the recipient receives a plain release credit.
            entry(recipient, EntryType::EscrowRelease, EntryDirection::Credit, 200, EntryStatus::Completed, false, "ord-9"),
        ];
        let payer_b = fold_balances(payer, &entries, "LRD");
        assert_eq!(payer_b.available, Money::from_minor(300));
        assert_eq!(payer_b.pending_held, Money::ZERO);

        let recipient_b = fold_balances(recipient, &entries, "LRD");
        assert_eq!(recipient_b.available, Money::from_minor(200));
    }

    #[test]
    fn test_fold_pending_debit_not_subtracted() {
        let user = UserId::new();
        let entries = vec![
            entry(user, EntryType::Topup, EntryDirection::Credit, 100, EntryStatus::Completed, false, "t1"),
            // A pending withdraw must not move available; only completion does.
            entry(user, EntryType::Withdraw, EntryDirection::Debit, 40, EntryStatus::Pending, false, "w1"),
        ];
        let b = fold_balances(user, &entries, "LRD");
        assert_eq!(b.available, Money::from_minor(100));
    }
}
