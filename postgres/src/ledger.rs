//! PostgreSQL ledger store.

use crate::error::{corrupt, map_sqlx};
use sokoni_core::ids::{EntryId, UserId};
use sokoni_core::model::{EntryDirection, EntryStatus, EntryType, LedgerEntry};
use sokoni_core::money::{Balances, Money};
use sokoni_core::repository::{fold_balances, LedgerAppend, LedgerStore};
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// PostgreSQL-backed [`LedgerStore`].
///
/// Idempotency rides on the partial unique index over
/// `(user_id, reference, entry_type) WHERE reference <> ''`: the append
/// is `ON CONFLICT DO NOTHING`, and a missed insert means the original
/// row already exists.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENTRY_COLUMNS: &str = "id, user_id, entry_type, direction, amount, currency, status, \
     is_escrow, reference, provider_reference, description, created_at, updated_at";

fn status_tag(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "pending",
        EntryStatus::Completed => "completed",
        EntryStatus::Failed => "failed",
    }
}

fn parse_status(raw: &str) -> RepoResult<EntryStatus> {
    match raw {
        "pending" => Ok(EntryStatus::Pending),
        "completed" => Ok(EntryStatus::Completed),
        "failed" => Ok(EntryStatus::Failed),
        other => Err(corrupt("status", other)),
    }
}

fn parse_type(raw: &str) -> RepoResult<EntryType> {
    match raw {
        "topup" => Ok(EntryType::Topup),
        "payment" => Ok(EntryType::Payment),
        "escrow_hold" => Ok(EntryType::EscrowHold),
        "escrow_release" => Ok(EntryType::EscrowRelease),
        "withdraw" => Ok(EntryType::Withdraw),
        other => Err(corrupt("entry_type", other)),
    }
}

fn row_to_entry(row: &PgRow) -> RepoResult<LedgerEntry> {
    let type_raw: String = row.try_get("entry_type").map_err(map_sqlx)?;
    let direction_raw: String = row.try_get("direction").map_err(map_sqlx)?;
    let status_raw: String = row.try_get("status").map_err(map_sqlx)?;
    let direction = match direction_raw.as_str() {
        "credit" => EntryDirection::Credit,
        "debit" => EntryDirection::Debit,
        other => return Err(corrupt("direction", other)),
    };
    Ok(LedgerEntry {
        id: EntryId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        entry_type: parse_type(&type_raw)?,
        direction,
        amount: Money::from_minor(row.try_get("amount").map_err(map_sqlx)?),
        currency: row.try_get("currency").map_err(map_sqlx)?,
        status: parse_status(&status_raw)?,
        is_escrow: row.try_get("is_escrow").map_err(map_sqlx)?,
        reference: row.try_get("reference").map_err(map_sqlx)?,
        provider_reference: row.try_get("provider_reference").map_err(map_sqlx)?,
        description: row.try_get("description").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
    })
}

impl LedgerStore for PostgresLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> RepoResult<LedgerAppend> {
        let direction = match entry.direction {
            EntryDirection::Credit => "credit",
            EntryDirection::Debit => "debit",
        };
        let inserted = sqlx::query(&format!(
            "INSERT INTO ledger_entries ({ENTRY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (user_id, reference, entry_type) WHERE reference <> '' DO NOTHING \
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(entry.id.0)
        .bind(entry.user_id.0)
        .bind(entry.entry_type.as_str())
        .bind(direction)
        .bind(entry.amount.minor())
        .bind(&entry.currency)
        .bind(status_tag(entry.status))
        .bind(entry.is_escrow)
        .bind(&entry.reference)
        .bind(&entry.provider_reference)
        .bind(&entry.description)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = inserted {
            return Ok(LedgerAppend {
                entry: row_to_entry(&row)?,
                deduplicated: false,
            });
        }

        // The partial unique index absorbed the insert: surface the
        // original row.
        let prior = self
            .find_by_user_reference(entry.user_id, &entry.reference, entry.entry_type)
            .await?
            .ok_or_else(|| {
                RepoError::PermanentIo("idempotency index hit but prior row missing".into())
            })?;
        Ok(LedgerAppend {
            entry: prior,
            deduplicated: true,
        })
    }

    async fn update_status(
        &self,
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
        provider_reference: Option<&str>,
    ) -> RepoResult<LedgerEntry> {
        if !from.can_transition_to(to) {
            return Err(RepoError::VersionConflict);
        }
        let row = sqlx::query(&format!(
            "UPDATE ledger_entries \
             SET status = $3, provider_reference = COALESCE($4, provider_reference), \
                 updated_at = $5 \
             WHERE id = $1 AND status = $2 \
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(entry_id.0)
        .bind(status_tag(from))
        .bind(status_tag(to))
        .bind(provider_reference)
        .bind(chrono::Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => row_to_entry(&row),
            None => {
                self.get(entry_id).await?;
                Err(RepoError::VersionConflict)
            }
        }
    }

    async fn get(&self, entry_id: EntryId) -> RepoResult<LedgerEntry> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(entry_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_entry(&row)
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<LedgerEntry>> {
        if reference.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE reference = $1 ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn find_by_user_reference(
        &self,
        user_id: UserId,
        reference: &str,
        entry_type: EntryType,
    ) -> RepoResult<Option<LedgerEntry>> {
        if reference.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE user_id = $1 AND reference = $2 AND entry_type = $3"
        ))
        .bind(user_id.0)
        .bind(reference)
        .bind(entry_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> RepoResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn balances(&self, user_id: UserId, currency: &str) -> RepoResult<Balances> {
        // The fold is shared with the in-memory store so both backends
        // agree to the cent.
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE user_id = $1"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let entries: Vec<LedgerEntry> = rows
            .iter()
            .map(row_to_entry)
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(fold_balances(user_id, &entries, currency))
    }
}
