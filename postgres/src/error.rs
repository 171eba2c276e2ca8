//! sqlx → repository error translation.

use sokoni_core::RepoError;

/// Map a sqlx failure onto the repository failure model.
///
/// Unique violations and row absence keep their meaning; connection-level
/// failures are retryable `TransientIo`; everything else is permanent.
pub(crate) fn map_sqlx(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::UniqueViolation,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            RepoError::TransientIo(e.to_string())
        }
        _ => RepoError::PermanentIo(e.to_string()),
    }
}

/// A stored tag failed to parse back into its enum: the row is corrupt,
/// not the connection.
pub(crate) fn corrupt(what: &str, raw: &str) -> RepoError {
    RepoError::PermanentIo(format!("corrupt {what} tag in row: {raw}"))
}
