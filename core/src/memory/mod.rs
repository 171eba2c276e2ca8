//! In-memory store implementations.
//!
//! These back development and the test suites. They honor the exact
//! concurrency contract of the durable stores: every operation the
//! repository marks atomic is a compare-and-set under the store's lock,
//! so races exercised in tests behave the way they would against
//! PostgreSQL.
//!
//! Memory is only reclaimed by the sweep operations (queue, metrics) and
//! the TTL checks of the revocation store — fine for tests and dev
//! processes, not for long-lived production use.

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

pub use audit::MemoryAuditStore;
pub use document::MemoryDocumentStore;
pub use ledger::MemoryLedgerStore;
pub use otp::MemoryOtpStore;
pub use payment_token::MemoryPaymentTokenStore;
pub use revocation::MemoryRevocationStore;
pub use session::MemorySessionStore;
pub use sync_checkpoint::MemoryCheckpointStore;
pub use sync_metrics::MemorySyncMetricsStore;
pub use sync_queue::MemorySyncQueueStore;
pub use user::MemoryUserStore;

use crate::error::RepoError;

/// Error for a poisoned store lock: a writer panicked mid-operation, so
/// the map can no longer be trusted.
pub(crate) fn poisoned() -> RepoError {
    RepoError::PermanentIo("store lock poisoned".to_string())
}
