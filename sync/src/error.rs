//! Error types for synchronization operations.

use sokoni_core::RepoError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure taxonomy of the sync core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Request payload failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Checkpoint or resume token failed to decode.
    #[error("Invalid checkpoint")]
    InvalidCheckpoint,

    /// The addressed item or record does not exist.
    #[error("Not found")]
    NotFound,

    /// A manual conflict still needs a user decision.
    #[error("Conflict requires user input")]
    RequiresUserInput,

    /// Optimistic update lost a race; re-read and retry.
    #[error("Version conflict")]
    VersionConflict,

    /// Transient infrastructure failure; retry with backoff.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent infrastructure failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The operation was cancelled before completion.
    #[error("Cancelled")]
    Cancelled,
}

impl SyncError {
    /// `true` for failures a queue worker should schedule a retry for.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::VersionConflict)
    }
}

impl From<RepoError> for SyncError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => Self::NotFound,
            RepoError::VersionConflict => Self::VersionConflict,
            RepoError::UniqueViolation => Self::VersionConflict,
            RepoError::TransientIo(msg) => Self::Transient(msg),
            RepoError::PermanentIo(msg) => Self::Internal(msg),
            RepoError::Cancelled => Self::Cancelled,
        }
    }
}
