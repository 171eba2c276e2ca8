//! Error types for wallet and payment operations.

use sokoni_core::RepoError;
use thiserror::Error;

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Failure taxonomy of the wallet and payment core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WalletError {
    /// Request payload failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The available balance does not cover the amount.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// The addressed entry, user, or token does not exist.
    #[error("Not found")]
    NotFound,

    /// The payment token does not exist or failed validation.
    #[error("Invalid payment token")]
    InvalidToken,

    /// The payment token has been revoked.
    #[error("Payment token revoked")]
    TokenRevoked,

    /// The mobile-money or card provider is unreachable; retry with
    /// backoff.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Encryption or decryption failed. Fatal: the operation is refused
    /// rather than persisted in the clear.
    #[error("Encryption failure")]
    EncryptionFailure,

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

impl WalletError {
    /// `true` when the caller may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::Transient(_) | Self::VersionConflict
        )
    }
}

impl From<RepoError> for WalletError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => Self::NotFound,
            RepoError::VersionConflict => Self::VersionConflict,
            RepoError::UniqueViolation => Self::VersionConflict,
            RepoError::TransientIo(msg) => Self::Transient(msg),
            RepoError::PermanentIo(msg) => Self::Internal(msg),
            RepoError::Cancelled => Self::Transient("cancelled".to_string()),
        }
    }
}
