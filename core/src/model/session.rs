//! Device sessions.

use crate::ids::{DeviceId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client platform the session was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple mobile devices.
    Ios,

    /// Android devices.
    Android,

    /// Browser clients.
    Web,
}

impl Platform {
    /// Stable lowercase tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }

    /// Parse a lowercase platform tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

/// Biometric modality enabled on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricType {
    /// Fingerprint sensor.
    Fingerprint,

    /// Face recognition.
    Face,
}

/// An authenticated session for one (user, device) pair.
///
/// Invariant: at most one live refresh token per session. Rotation swaps
/// the stored hash with a compare-and-set, so a stale token can never be
/// exchanged twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSession {
    /// Session identifier.
    pub id: SessionId,

    /// Owning user.
    pub user_id: UserId,

    /// Opaque client-minted device identifier.
    pub device_id: DeviceId,

    /// Human-readable device name ("Tecno Spark 10").
    pub device_name: String,

    /// Client platform.
    pub platform: Platform,

    /// Optional app version string reported at login.
    pub app_version: Option<String>,

    /// IP address snapshot from session creation.
    pub ip_address: String,

    /// User-agent snapshot from session creation.
    pub user_agent: String,

    /// SHA-256 hash of the current refresh token; `None` after revocation.
    pub refresh_token_hash: Option<String>,

    /// Whether the session can still authenticate.
    pub is_active: bool,

    /// Whether biometric unlock is enabled for this device.
    pub biometric_enabled: bool,

    /// Biometric modality, when enabled.
    pub biometric_type: Option<BiometricType>,

    /// Last time the session was used.
    pub last_activity: DateTime<Utc>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Revocation timestamp, when revoked.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    /// `true` when the session has been idle longer than `idle_ttl` or has
    /// outlived `absolute_ttl`.
    #[must_use]
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        idle_ttl: chrono::Duration,
        absolute_ttl: chrono::Duration,
    ) -> bool {
        now - self.last_activity > idle_ttl || now - self.created_at > absolute_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tags_roundtrip() {
        for p in [Platform::Ios, Platform::Android, Platform::Web] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse("windows"), None);
    }
}
