//! Error types for authentication operations.

use chrono::{DateTime, Utc};
use sokoni_core::RepoError;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure taxonomy of the auth core.
///
/// Credential failures — bad password, unknown account, malformed input on
/// the login path — all collapse into [`AuthError::InvalidCredentials`]
/// with uniform timing, so callers cannot enumerate accounts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Client errors
    // ═══════════════════════════════════════════════════════════
    /// Request payload failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credentials did not verify. Deliberately carries no detail.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration collided with an existing account.
    #[error("Account already exists")]
    Conflict,

    /// The addressed resource does not exist.
    #[error("Not found")]
    NotFound,

    /// The caller does not own the addressed resource.
    #[error("Permission denied")]
    PermissionDenied,

    // ═══════════════════════════════════════════════════════════
    // Rate / security errors
    // ═══════════════════════════════════════════════════════════
    /// The gate requires a captcha before further attempts.
    #[error("Captcha required; {remaining} attempts remain before lockout")]
    CaptchaRequired {
        /// Attempts left before the lockout threshold.
        remaining: u32,
    },

    /// The gate has locked this email or source address out.
    #[error("Locked out until {until}")]
    LockedOut {
        /// Instant the lockout lifts.
        until: DateTime<Utc>,
    },

    /// A refresh token was presented twice — theft signal; the session has
    /// been revoked.
    #[error("Refresh token replay detected")]
    ReplayDetected,

    /// The session backing the token has been revoked.
    #[error("Session has been revoked")]
    SessionRevoked,

    // ═══════════════════════════════════════════════════════════
    // Token errors
    // ═══════════════════════════════════════════════════════════
    /// Token signature or shape did not verify.
    #[error("Invalid token")]
    TokenInvalid,

    /// Token verified but is past its expiry.
    #[error("Token expired")]
    TokenExpired,

    // ═══════════════════════════════════════════════════════════
    // Concurrency / infrastructure
    // ═══════════════════════════════════════════════════════════
    /// Optimistic update lost a race; re-read and retry.
    #[error("Version conflict")]
    VersionConflict,

    /// Transient infrastructure failure; retry with backoff.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent infrastructure failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// `true` when the caller may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict | Self::Transient(_))
    }
}

impl From<RepoError> for AuthError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => Self::NotFound,
            RepoError::VersionConflict => Self::VersionConflict,
            RepoError::UniqueViolation => Self::Conflict,
            RepoError::TransientIo(msg) => Self::Transient(msg),
            RepoError::PermanentIo(msg) => Self::Internal(msg),
            RepoError::Cancelled => Self::Transient("cancelled".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_error_translation() {
        assert_eq!(AuthError::from(RepoError::NotFound), AuthError::NotFound);
        assert_eq!(
            AuthError::from(RepoError::UniqueViolation),
            AuthError::Conflict
        );
        assert!(AuthError::from(RepoError::TransientIo("t".into())).is_retryable());
    }
}
