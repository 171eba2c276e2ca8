//! Request and response types of the auth surface.

use crate::tokens::TokenPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokoni_core::ids::{DeviceId, SessionId, UserId};
use sokoni_core::model::{BiometricType, Platform, User, UserRole};
use sokoni_core::Money;

/// Device details supplied at login and registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Opaque client-minted device id.
    pub device_id: DeviceId,

    /// Human-readable device name.
    pub device_name: String,

    /// Client platform.
    pub platform: Platform,

    /// Optional app version string.
    pub app_version: Option<String>,
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Email address; normalized before storage.
    pub email: String,

    /// Phone number.
    pub phone: String,

    /// Cleartext password; hashed immediately.
    pub password: String,

    /// First name.
    pub first_name: String,

    /// Last name.
    pub last_name: String,

    /// Requested role. Admin cannot be self-assigned.
    pub role: UserRole,

    /// Device opening the first session.
    pub device: DeviceInfo,
}

/// Login request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,

    /// Cleartext password.
    pub password: String,

    /// Captcha solution, required once the gate demands one.
    pub captcha_token: Option<String>,

    /// Device opening the session.
    pub device: DeviceInfo,
}

/// Biometric unlock request: the challenge and signature previously issued
/// by [`crate::service::AuthCore::biometric_challenge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricUnlockRequest {
    /// Device presenting the challenge.
    pub device_id: DeviceId,

    /// The issued challenge.
    pub challenge: String,

    /// The issued signature, released by the device after local biometric
    /// verification.
    pub signature: String,
}

/// Public projection of a user — everything the client may see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: UserId,

    /// Email address.
    pub email: String,

    /// Phone number.
    pub phone: String,

    /// First name.
    pub first_name: String,

    /// Last name.
    pub last_name: String,

    /// Role.
    pub role: UserRole,

    /// Email verification flag.
    pub email_verified: bool,

    /// Cached wallet balance.
    pub wallet_balance: Money,

    /// Cached wallet currency.
    pub wallet_currency: String,

    /// Last completed sync, if any.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            phone: user.phone.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            email_verified: user.email_verified,
            wallet_balance: user.wallet_balance,
            wallet_currency: user.wallet_currency.clone(),
            last_sync_at: user.last_sync_at,
        }
    }
}

/// Successful authentication: the user, the session, and a token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The authenticated user.
    pub user: UserProfile,

    /// Session the tokens are bound to.
    pub session_id: SessionId,

    /// Fresh token pair.
    pub tokens: TokenPair,
}

/// Session listing entry — the refresh hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id.
    pub id: SessionId,

    /// Device id.
    pub device_id: DeviceId,

    /// Device name.
    pub device_name: String,

    /// Platform.
    pub platform: Platform,

    /// IP snapshot from creation.
    pub ip_address: String,

    /// Whether the session can still authenticate.
    pub is_active: bool,

    /// Whether biometric unlock is enabled.
    pub biometric_enabled: bool,

    /// Biometric modality, when enabled.
    pub biometric_type: Option<BiometricType>,

    /// Last use.
    pub last_activity: DateTime<Utc>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&sokoni_core::model::DeviceSession> for SessionInfo {
    fn from(s: &sokoni_core::model::DeviceSession) -> Self {
        Self {
            id: s.id,
            device_id: s.device_id.clone(),
            device_name: s.device_name.clone(),
            platform: s.platform,
            ip_address: s.ip_address.clone(),
            is_active: s.is_active,
            biometric_enabled: s.biometric_enabled,
            biometric_type: s.biometric_type,
            last_activity: s.last_activity,
            created_at: s.created_at,
        }
    }
}
