//! # Sokoni Core
//!
//! Shared foundation for the Sokoni marketplace backend: the domain model,
//! the repository contract, the audit trail, and environment configuration.
//!
//! ## Architecture
//!
//! The repository is the single owner of persisted state. Service crates
//! (`sokoni-auth`, `sokoni-sync`, `sokoni-wallet`) depend on the traits in
//! [`repository`] and never on a concrete store:
//!
//! ```text
//! auth / sync / wallet ──► repository traits ──► memory (dev/test)
//!                                           └──► sokoni-postgres (durable)
//! ```
//!
//! Every trait method returns [`error::RepoError`] so callers can
//! distinguish retryable (`TransientIo`, `VersionConflict`) from fatal
//! failures without knowing which backend is wired in.
//!
//! The in-memory stores in [`memory`] implement the identical concurrency
//! contract as the durable ones (compare-and-set under a lock, linearizable
//! per key) and back the test suites of every service crate.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod audit;
pub mod config;
pub mod error;
pub mod ids;
pub mod memory;
pub mod model;
pub mod money;
pub mod repository;

pub use audit::{AuditAction, AuditActor, AuditEntry, AuditRecorder, AuditResource};
pub use config::{Environment, SecretKey};
pub use error::{ConfigError, RepoError, RepoResult};
pub use ids::{AuditEntryId, DeviceId, EntryId, PaymentTokenId, SessionId, SyncItemId, UserId};
pub use money::{Balances, Money};
