//! User identity.

use crate::ids::UserId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Buys services on the marketplace.
    Customer,

    /// Offers services on the marketplace.
    Provider,

    /// Operates the platform.
    Admin,
}

impl UserRole {
    /// Stable lowercase tag used in tokens and audit rows.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Provider => "provider",
            Self::Admin => "admin",
        }
    }

    /// Parse a lowercase role tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "customer" => Some(Self::Customer),
            "provider" => Some(Self::Provider),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Postal address snapshot carried on the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street line.
    pub street: String,

    /// City.
    pub city: String,

    /// County or region.
    pub county: String,

    /// Country code.
    pub country: String,
}

/// A registered user.
///
/// Never destroyed: admin removal sets `deleted_at` and the account becomes
/// invisible to email lookups while remaining addressable for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: UserId,

    /// Unique, case-normalized email.
    pub email: String,

    /// Phone number in E.164-ish form; not validated beyond length.
    pub phone: String,

    /// First name.
    pub first_name: String,

    /// Last name.
    pub last_name: String,

    /// bcrypt hash of the password.
    pub password_hash: String,

    /// Account role.
    pub role: UserRole,

    /// Whether the email address has been verified.
    pub email_verified: bool,

    /// Optional profile image URL.
    pub profile_image: Option<String>,

    /// Optional postal address.
    pub address: Option<Address>,

    /// Cached wallet balance projection; the ledger fold is authoritative.
    pub wallet_balance: Money,

    /// Currency of the cached wallet balance.
    pub wallet_currency: String,

    /// Timestamp of the last completed sync, if any.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Client-reported offline flag.
    pub is_offline: bool,

    /// Optimistic concurrency version.
    pub version: u64,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Full display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// `true` when the account has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Normalize an email for storage and lookup: trim whitespace and lowercase
/// the ASCII range. Applied on every create and every lookup so the unique
/// index sees one spelling per address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tags_roundtrip() {
        for role in [UserRole::Customer, UserRole::Provider, UserRole::Admin] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("superuser"), None);
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email("bob@x.y"), "bob@x.y");
    }
}
