//! Monetary amounts in integer minor units.
//!
//! All wallet arithmetic happens on [`Money`] — a signed 64-bit count of
//! minor units (cents for USD, dollars for LRD which has no subunit in
//! practice). Floating point never touches a balance.

use serde::{Deserialize, Serialize};

/// Amount in minor units.
///
/// # Examples
///
/// ```
/// use sokoni_core::Money;
///
/// let a = Money::from_minor(250);
/// let b = Money::from_minor(100);
/// assert_eq!(a.checked_sub(b), Some(Money::from_minor(150)));
/// assert!(Money::from_minor(-1).is_negative());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition, pinned at `i64` bounds.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction, pinned at `i64` bounds.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `true` when the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `true` when the amount is below zero.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `true` when the amount is strictly above zero.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance projection for one user, derived by folding the ledger.
///
/// `available` counts completed non-escrow credits minus completed
/// non-escrow debits minus open escrow holds; `pending_held` is the sum of
/// open escrow holds. `total` is their sum — the funds the user owns,
/// spendable or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Spendable balance.
    pub available: Money,

    /// Funds locked in open escrow holds.
    pub pending_held: Money,

    /// `available + pending_held`.
    pub total: Money,

    /// Currency code the balances are denominated in.
    pub currency: String,
}

impl Balances {
    /// An empty balance in the given currency.
    #[must_use]
    pub fn zero(currency: impl Into<String>) -> Self {
        Self {
            available: Money::ZERO,
            pending_held: Money::ZERO,
            total: Money::ZERO,
            currency: currency.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let max = Money::from_minor(i64::MAX);
        assert_eq!(max.checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_minor(5).checked_sub(Money::from_minor(7)),
            Some(Money::from_minor(-2))
        );
    }

    #[test]
    fn test_zero_balances() {
        let b = Balances::zero("LRD");
        assert!(b.available.is_zero());
        assert!(b.pending_held.is_zero());
        assert_eq!(b.currency, "LRD");
    }
}
