//! Append-only double-entry ledger records.

use crate::ids::{EntryId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business meaning of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Inbound mobile-money collection.
    Topup,

    /// Debit settling a completed escrow against the payer.
    Payment,

    /// Funds moved from available into escrow.
    EscrowHold,

    /// Funds leaving escrow: to the recipient on completion, back to the
    /// payer on cancellation.
    EscrowRelease,

    /// Outbound mobile-money disbursement.
    Withdraw,
}

impl EntryType {
    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::Payment => "payment",
            Self::EscrowHold => "escrow_hold",
            Self::EscrowRelease => "escrow_release",
            Self::Withdraw => "withdraw",
        }
    }
}

/// Which side of the user's balance the entry moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    /// Increases the balance.
    Credit,

    /// Decreases the balance.
    Debit,
}

/// Settlement state of an entry.
///
/// The only legal transitions are `Pending → Completed` and
/// `Pending → Failed`; everything else is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Awaiting provider settlement.
    Pending,

    /// Settled; counted by the balance fold.
    Completed,

    /// Provider rejected; never counted.
    Failed,
}

impl EntryStatus {
    /// `true` when `self → to` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }
}

/// One immutable ledger row.
///
/// Entries never change after append except for the status transition
/// above. The triple `(user_id, reference, entry_type)` is unique whenever
/// `reference` is non-empty — a retried webhook or client call lands on the
/// original row instead of minting a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry identifier.
    pub id: EntryId,

    /// User whose balance the entry moves.
    pub user_id: UserId,

    /// Business meaning.
    pub entry_type: EntryType,

    /// Credit or debit.
    pub direction: EntryDirection,

    /// Non-negative amount in minor units.
    pub amount: Money,

    /// Currency code.
    pub currency: String,

    /// Settlement state.
    pub status: EntryStatus,

    /// Marks entries excluded from the available-balance sums (escrow
    /// holds and cancellation refunds).
    pub is_escrow: bool,

    /// External reference used as idempotency key; empty when none.
    pub reference: String,

    /// Provider-side reference, when the provider reported one.
    pub provider_reference: Option<String>,

    /// Description shown to the user.
    pub description: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last status change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `true` when this entry participates in the available-balance sums:
    /// completed and not escrow-flagged.
    #[must_use]
    pub fn counts_toward_available(&self) -> bool {
        self.status == EntryStatus::Completed && !self.is_escrow
    }

    /// `true` for an escrow hold that has settled (holds are appended
    /// completed; openness is decided by the fold via reference matching).
    #[must_use]
    pub fn is_escrow_hold(&self) -> bool {
        self.entry_type == EntryType::EscrowHold && self.status == EntryStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_status_transitions() {
        assert!(EntryStatus::Pending.can_transition_to(EntryStatus::Completed));
        assert!(EntryStatus::Pending.can_transition_to(EntryStatus::Failed));
        assert!(!EntryStatus::Completed.can_transition_to(EntryStatus::Failed));
        assert!(!EntryStatus::Completed.can_transition_to(EntryStatus::Pending));
        assert!(!EntryStatus::Failed.can_transition_to(EntryStatus::Completed));
    }
}
