//! # Sokoni PostgreSQL stores
//!
//! Durable implementations of the `sokoni-core` repository traits.
//! Every operation the contract marks atomic maps to a conditional SQL
//! statement PostgreSQL serializes per row:
//!
//! - refresh rotation → `UPDATE … WHERE refresh_token_hash = $old`
//! - ledger idempotency → partial unique index + `ON CONFLICT DO NOTHING`
//! - queue claiming → `FOR UPDATE SKIP LOCKED`
//! - optimistic entity updates → `WHERE version = $expected`
//!
//! The revocation list is the one store without a PostgreSQL variant: its
//! TTL semantics belong in Redis (`sokoni-auth::stores`) or the in-memory
//! fallback.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod audit;
mod error;
mod ledger;
mod otp;
mod payment_token;
mod session;
mod sync;
mod user;

pub use audit::PostgresAuditStore;
pub use ledger::PostgresLedgerStore;
pub use otp::PostgresOtpStore;
pub use payment_token::PostgresPaymentTokenStore;
pub use session::PostgresSessionStore;
pub use sync::{
    PostgresCheckpointStore, PostgresDocumentStore, PostgresSyncMetricsStore,
    PostgresSyncQueueStore,
};
pub use user::PostgresUserStore;

use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect a pool with sane defaults for the backend services.
///
/// # Errors
///
/// `TransientIo` when the database is unreachable.
pub async fn connect(database_url: &str) -> RepoResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| RepoError::TransientIo(format!("connect postgres: {e}")))
}

/// Run the embedded migrations.
///
/// # Errors
///
/// `PermanentIo` when a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> RepoResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RepoError::PermanentIo(format!("migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Convenience bundle wiring every store over one pool.
#[derive(Clone)]
pub struct PostgresRepository {
    /// User store.
    pub users: PostgresUserStore,

    /// Session store.
    pub sessions: PostgresSessionStore,

    /// OTP store.
    pub otps: PostgresOtpStore,

    /// Payment token store.
    pub payment_tokens: PostgresPaymentTokenStore,

    /// Ledger store.
    pub ledger: PostgresLedgerStore,

    /// Checkpoint store.
    pub checkpoints: PostgresCheckpointStore,

    /// Queue store.
    pub queue: PostgresSyncQueueStore,

    /// Metrics store.
    pub metrics: PostgresSyncMetricsStore,

    /// Document store.
    pub documents: PostgresDocumentStore,

    /// Audit store.
    pub audit: PostgresAuditStore,
}

impl PostgresRepository {
    /// Build every store over a shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: PostgresUserStore::new(pool.clone()),
            sessions: PostgresSessionStore::new(pool.clone()),
            otps: PostgresOtpStore::new(pool.clone()),
            payment_tokens: PostgresPaymentTokenStore::new(pool.clone()),
            ledger: PostgresLedgerStore::new(pool.clone()),
            checkpoints: PostgresCheckpointStore::new(pool.clone()),
            queue: PostgresSyncQueueStore::new(pool.clone()),
            metrics: PostgresSyncMetricsStore::new(pool.clone()),
            documents: PostgresDocumentStore::new(pool.clone()),
            audit: PostgresAuditStore::new(pool),
        }
    }
}
