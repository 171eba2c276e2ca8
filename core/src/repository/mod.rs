//! Repository contract.
//!
//! One trait per entity family. These are **interfaces**, not
//! implementations: service crates depend on the traits, and the process
//! owner wires in concrete stores at startup.
//!
//! Two implementation families ship with the workspace:
//!
//! - **In-memory** ([`crate::memory`]): mutex-protected maps with the same
//!   concurrency contract, for development and tests.
//! - **PostgreSQL** (`sokoni-postgres`): durable stores with conditional
//!   updates for every operation marked atomic.
//!
//! Operations marked *atomic* must be linearizable with respect to other
//! operations on the same key. Every method fails with [`RepoError`]
//! (`NotFound`, `VersionConflict`, `UniqueViolation`, `TransientIo`,
//! `PermanentIo`, `Cancelled`); callers retry `TransientIo` with backoff
//! and re-read on `VersionConflict`.
//!
//! [`RepoError`]: crate::error::RepoError

mod audit;
mod document;
mod ledger;
mod otp;
mod payment_token;
mod revocation;
mod session;
mod sync_checkpoint;
mod sync_metrics;
mod sync_queue;
mod user;

pub use audit::AuditStore;
pub use document::{ApplyOutcome, Document, DocumentChange, DocumentStore};
pub use ledger::{fold_balances, LedgerAppend, LedgerStore};
pub use otp::OtpStore;
pub use payment_token::PaymentTokenStore;
pub use revocation::RevocationStore;
pub use session::SessionStore;
pub use sync_checkpoint::CheckpointStore;
pub use sync_metrics::SyncMetricsStore;
pub use sync_queue::{QueueCounts, SyncQueueStore};
pub use user::UserStore;
