//! Tamper-evident audit trail.
//!
//! Audit entries are immutable: application code appends and queries, never
//! updates or deletes. Appends are best-effort from the caller's point of
//! view — a failing audit store must never fail the business operation it
//! was recording, so [`AuditRecorder::record`] swallows store errors after
//! logging them.

use crate::error::RepoResult;
use crate::ids::{AuditEntryId, UserId};
use crate::model::UserRole;
use crate::repository::AuditStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Upper bound on a serialized detail map. Larger maps are replaced with a
/// truncation marker before append to keep log abuse bounded.
pub const MAX_DETAIL_BYTES: usize = 16 * 1024;

/// Action tags recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AuditAction {
    Register,
    LoginSuccess,
    LoginFailed,
    LoginBlocked,
    TokenRefresh,
    TokenReplayDetected,
    Logout,
    SessionRevoked,
    PasswordResetRequest,
    PasswordResetConfirm,
    BiometricChallenge,
    BiometricUnlock,
    SyncPull,
    SyncPush,
    SyncItemProcessed,
    ConflictResolved,
    WalletTopup,
    WalletPay,
    WalletEscrowRelease,
    WalletWithdraw,
    WebhookSettled,
    WebhookOrphan,
    TokenizeInstrument,
    PaymentProcess,
    PaymentTokenDeleted,
    UserSoftDeleted,
}

impl AuditAction {
    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::LoginBlocked => "login_blocked",
            Self::TokenRefresh => "token_refresh",
            Self::TokenReplayDetected => "token_replay_detected",
            Self::Logout => "logout",
            Self::SessionRevoked => "session_revoked",
            Self::PasswordResetRequest => "password_reset_request",
            Self::PasswordResetConfirm => "password_reset_confirm",
            Self::BiometricChallenge => "biometric_challenge",
            Self::BiometricUnlock => "biometric_unlock",
            Self::SyncPull => "sync_pull",
            Self::SyncPush => "sync_push",
            Self::SyncItemProcessed => "sync_item_processed",
            Self::ConflictResolved => "conflict_resolved",
            Self::WalletTopup => "wallet_topup",
            Self::WalletPay => "wallet_pay",
            Self::WalletEscrowRelease => "wallet_escrow_release",
            Self::WalletWithdraw => "wallet_withdraw",
            Self::WebhookSettled => "webhook_settled",
            Self::WebhookOrphan => "webhook_orphan",
            Self::TokenizeInstrument => "tokenize_instrument",
            Self::PaymentProcess => "payment_process",
            Self::PaymentTokenDeleted => "payment_token_deleted",
            Self::UserSoftDeleted => "user_soft_deleted",
        }
    }
}

/// Resource tags recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AuditResource {
    User,
    Session,
    Otp,
    LedgerEntry,
    PaymentToken,
    SyncQueueItem,
    SyncCheckpoint,
    Webhook,
}

impl AuditResource {
    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Session => "session",
            Self::Otp => "otp",
            Self::LedgerEntry => "ledger_entry",
            Self::PaymentToken => "payment_token",
            Self::SyncQueueItem => "sync_queue_item",
            Self::SyncCheckpoint => "sync_checkpoint",
            Self::Webhook => "webhook",
        }
    }
}

/// Who performed the audited action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditActor {
    /// Acting user, when authenticated.
    pub user_id: Option<UserId>,

    /// Email snapshot at the time of the action.
    pub email: Option<String>,

    /// Role snapshot at the time of the action.
    pub role: Option<UserRole>,
}

impl AuditActor {
    /// Anonymous actor (pre-authentication flows).
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Actor snapshot for an authenticated user.
    #[must_use]
    pub fn user(user_id: UserId, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: Some(user_id),
            email: Some(email.into()),
            role: Some(role),
        }
    }
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,

    /// Event timestamp. Concurrent entries may share a millisecond; the id
    /// breaks ties.
    pub timestamp: DateTime<Utc>,

    /// Who acted.
    pub actor: AuditActor,

    /// Action tag.
    pub action: AuditAction,

    /// Resource tag.
    pub resource: AuditResource,

    /// Identifier of the affected resource, when known.
    pub resource_id: Option<String>,

    /// Client IP snapshot.
    pub client_ip: Option<String>,

    /// User-agent snapshot.
    pub user_agent: Option<String>,

    /// Whether the audited operation succeeded.
    pub success: bool,

    /// Free-form structured detail, bounded by [`MAX_DETAIL_BYTES`].
    pub detail: BTreeMap<String, Value>,

    /// Error description for failed operations.
    pub error: Option<String>,
}

impl AuditEntry {
    /// Start building an entry for `action` on `resource`.
    #[must_use]
    pub fn builder(action: AuditAction, resource: AuditResource) -> AuditEntryBuilder {
        AuditEntryBuilder {
            actor: AuditActor::anonymous(),
            action,
            resource,
            resource_id: None,
            client_ip: None,
            user_agent: None,
            success: true,
            detail: BTreeMap::new(),
            error: None,
        }
    }
}

/// Builder for [`AuditEntry`].
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    actor: AuditActor,
    action: AuditAction,
    resource: AuditResource,
    resource_id: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    success: bool,
    detail: BTreeMap<String, Value>,
    error: Option<String>,
}

impl AuditEntryBuilder {
    /// Set the actor.
    #[must_use]
    pub fn actor(mut self, actor: AuditActor) -> Self {
        self.actor = actor;
        self
    }

    /// Set the affected resource id.
    #[must_use]
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Set the client IP snapshot.
    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Set the user-agent snapshot.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Mark the operation failed and record why.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Attach one detail key.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Finalize the entry, stamping id and timestamp.
    #[must_use]
    pub fn build(self) -> AuditEntry {
        let mut detail = self.detail;
        let serialized = serde_json::to_vec(&detail).map(|v| v.len()).unwrap_or(0);
        if serialized > MAX_DETAIL_BYTES {
            detail = BTreeMap::from([(
                "truncated".to_string(),
                Value::String(format!("detail map exceeded {MAX_DETAIL_BYTES} bytes")),
            )]);
        }
        AuditEntry {
            id: AuditEntryId::new(),
            timestamp: Utc::now(),
            actor: self.actor,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            success: self.success,
            detail,
            error: self.error,
        }
    }
}

/// Append-side facade over an [`AuditStore`].
///
/// Cloneable; shares the underlying store.
#[derive(Debug, Clone)]
pub struct AuditRecorder<S> {
    store: S,
}

impl<S: AuditStore> AuditRecorder<S> {
    /// Wrap a store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Append an entry, best-effort.
    ///
    /// Store failures are logged and swallowed: audit must never fail the
    /// originating business operation.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        if let Err(e) = self.store.append(&entry).await {
            tracing::warn!(
                action = action.as_str(),
                error = %e,
                "Audit append failed; entry dropped to process log"
            );
        }
    }

    /// Append an entry and surface the store error to the caller.
    ///
    /// Used by compliance jobs that must know the entry landed.
    ///
    /// # Errors
    ///
    /// Returns the underlying store error.
    pub async fn record_strict(&self, entry: AuditEntry) -> RepoResult<()> {
        self.store.append(&entry).await
    }

    /// Borrow the wrapped store for queries.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_stamps_identity() {
        let a = AuditEntry::builder(AuditAction::LoginSuccess, AuditResource::Session)
            .resource_id("abc")
            .detail("platform", "android")
            .build();
        let b = AuditEntry::builder(AuditAction::LoginSuccess, AuditResource::Session).build();
        assert_ne!(a.id, b.id);
        assert!(a.success);
        assert_eq!(a.resource_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_oversized_detail_is_truncated() {
        let huge = "x".repeat(MAX_DETAIL_BYTES + 1);
        let entry = AuditEntry::builder(AuditAction::SyncPush, AuditResource::SyncQueueItem)
            .detail("payload", huge)
            .build();
        assert!(entry.detail.contains_key("truncated"));
        assert_eq!(entry.detail.len(), 1);
    }

    #[test]
    fn test_failed_marks_error() {
        let entry = AuditEntry::builder(AuditAction::LoginFailed, AuditResource::User)
            .failed("invalid credentials")
            .build();
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("invalid credentials"));
    }
}
