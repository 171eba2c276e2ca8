//! Stored payment instruments.

use crate::ids::{PaymentTokenId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a payment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentTokenStatus {
    /// Usable for charges.
    Active,

    /// Deleted by the owner; payload pending purge after the settlement
    /// window.
    Revoked,
}

/// Opaque handle to a stored payment instrument.
///
/// Invariant: cleartext PAN and CVV are never persisted nor logged. Only
/// the AES-GCM envelope and non-sensitive display metadata live here; the
/// encryption key is process-held and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentToken {
    /// Token identifier, handed to clients in place of the instrument.
    pub id: PaymentTokenId,

    /// Owning user.
    pub owner_id: UserId,

    /// Display-safe masking: last four digits only.
    pub masked_last4: String,

    /// Display-safe card brand ("visa", "mastercard", …).
    pub brand: String,

    /// AES-256-GCM envelope of the instrument: `nonce ‖ ciphertext`.
    #[serde(with = "serde_bytes_b64")]
    pub encrypted_payload: Vec<u8>,

    /// Lifecycle status.
    pub status: PaymentTokenStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PaymentToken {
    /// `true` when the token may be charged.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PaymentTokenStatus::Active
    }
}

/// Serialize the encrypted envelope as base64 so JSON exports stay textual.
mod serde_bytes_b64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(de)?;
        STANDARD
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
