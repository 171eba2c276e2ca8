//! Persisted domain entities.
//!
//! Entities with a `version` field use optimistic concurrency: writes must
//! present the observed version or fail with
//! [`RepoError::VersionConflict`](crate::error::RepoError::VersionConflict).

mod ledger;
mod otp;
mod payment;
mod session;
mod sync;
mod user;

pub use ledger::{EntryDirection, EntryStatus, EntryType, LedgerEntry};
pub use otp::{OtpPurpose, OtpRecord};
pub use payment::{PaymentToken, PaymentTokenStatus};
pub use session::{BiometricType, DeviceSession, Platform};
pub use sync::{
    Collection, ConflictDescriptor, ConflictType, ResolutionStrategy, SyncCheckpoint, SyncItemType,
    SyncMetrics, SyncQueueItem, SyncQueueStatus, SyncStatus, Watermark,
};
pub use user::{normalize_email, Address, User, UserRole};
