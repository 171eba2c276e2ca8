//! Repository failure model and configuration errors.

use thiserror::Error;

/// Result type alias for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Failure model shared by every repository implementation.
///
/// Service crates translate these into their own domain errors at the
/// component boundary; the variants themselves bubble out of stores
/// unchanged so retry policy can be decided in one place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// The addressed row does not exist.
    #[error("Not found")]
    NotFound,

    /// An optimistic update observed a version other than the expected one.
    ///
    /// The caller must re-read and re-attempt.
    #[error("Version conflict")]
    VersionConflict,

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violation")]
    UniqueViolation,

    /// Transient I/O failure; safe to retry with backoff.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Permanent I/O failure; retrying will not help.
    #[error("Permanent I/O error: {0}")]
    PermanentIo(String),

    /// The operation was cancelled before completion.
    #[error("Cancelled")]
    Cancelled,
}

impl RepoError {
    /// `true` for failures that a caller may retry.
    ///
    /// `VersionConflict` is retryable only after a re-read; `TransientIo`
    /// after backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict | Self::TransientIo(_))
    }
}

/// Startup configuration failure.
///
/// Raised when required secrets are missing, malformed, or placeholders in
/// environments that fail closed (production, staging).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required secret was not provided.
    #[error("Missing required secret: {name}")]
    MissingSecret {
        /// Environment variable name.
        name: String,
    },

    /// A secret failed to decode to the required 32 bytes.
    #[error("Secret {name} is not valid base64 for a 32-byte key")]
    MalformedSecret {
        /// Environment variable name.
        name: String,
    },

    /// A secret still carries a known placeholder value.
    #[error("Secret {name} is a placeholder and must be replaced")]
    PlaceholderSecret {
        /// Environment variable name.
        name: String,
    },

    /// Two secrets that must differ are identical.
    #[error("Secrets {a} and {b} must be distinct")]
    SecretsNotDistinct {
        /// First environment variable name.
        a: String,
        /// Second environment variable name.
        b: String,
    },

    /// A numeric tunable was outside its permitted range.
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Configuration field name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RepoError::VersionConflict.is_retryable());
        assert!(RepoError::TransientIo("timeout".into()).is_retryable());
        assert!(!RepoError::NotFound.is_retryable());
        assert!(!RepoError::UniqueViolation.is_retryable());
        assert!(!RepoError::PermanentIo("corrupt".into()).is_retryable());
        assert!(!RepoError::Cancelled.is_retryable());
    }
}
