//! One-time code store trait.

use crate::error::RepoResult;
use crate::model::{OtpPurpose, OtpRecord};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Persistence for [`OtpRecord`] rows.
pub trait OtpStore: Send + Sync {
    /// Insert a freshly issued code.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn create(&self, otp: &OtpRecord) -> impl Future<Output = RepoResult<OtpRecord>> + Send;

    /// Atomically verify and consume a code: the newest record matching
    /// `(email, code, purpose)` that is unexpired and unused gets its
    /// `used_at` stamped and is returned. *Atomic* — a code can be
    /// consumed exactly once even under concurrent confirms.
    ///
    /// # Errors
    ///
    /// `NotFound` when no usable record matches.
    fn consume(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<OtpRecord>> + Send;
}
