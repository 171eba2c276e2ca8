//! One-time codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an OTP authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Password reset confirmation.
    PasswordReset,

    /// Secondary verification of a sensitive action.
    Verification,
}

impl OtpPurpose {
    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::Verification => "verification",
        }
    }
}

/// Short-lived one-time code, addressed by email.
///
/// Invariant: once `used_at` is set, the code can never verify again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// Email of the account the code was issued for.
    pub email: String,

    /// The numeric code, stored as issued.
    pub code: String,

    /// What the code authorizes.
    pub purpose: OtpPurpose,

    /// Expiry; codes past this instant never verify.
    pub expires_at: DateTime<Utc>,

    /// Set when the code is consumed.
    pub used_at: Option<DateTime<Utc>>,

    /// Issuance timestamp.
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    /// `true` when the code can still be consumed at `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}
