//! PostgreSQL payment token store.

use crate::error::{corrupt, map_sqlx};
use sokoni_core::ids::{PaymentTokenId, UserId};
use sokoni_core::model::{PaymentToken, PaymentTokenStatus};
use sokoni_core::repository::PaymentTokenStore;
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// PostgreSQL-backed [`PaymentTokenStore`]. Only the AES-GCM envelope and
/// display metadata land here.
#[derive(Clone)]
pub struct PostgresPaymentTokenStore {
    pool: PgPool,
}

impl PostgresPaymentTokenStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TOKEN_COLUMNS: &str =
    "id, owner_id, masked_last4, brand, encrypted_payload, status, created_at, updated_at";

fn row_to_token(row: &PgRow) -> RepoResult<PaymentToken> {
    let status_raw: String = row.try_get("status").map_err(map_sqlx)?;
    let status = match status_raw.as_str() {
        "active" => PaymentTokenStatus::Active,
        "revoked" => PaymentTokenStatus::Revoked,
        other => return Err(corrupt("status", other)),
    };
    Ok(PaymentToken {
        id: PaymentTokenId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(map_sqlx)?),
        masked_last4: row.try_get("masked_last4").map_err(map_sqlx)?,
        brand: row.try_get("brand").map_err(map_sqlx)?,
        encrypted_payload: row.try_get("encrypted_payload").map_err(map_sqlx)?,
        status,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
    })
}

impl PaymentTokenStore for PostgresPaymentTokenStore {
    async fn create(&self, token: &PaymentToken) -> RepoResult<PaymentToken> {
        let status = match token.status {
            PaymentTokenStatus::Active => "active",
            PaymentTokenStatus::Revoked => "revoked",
        };
        let row = sqlx::query(&format!(
            "INSERT INTO payment_tokens ({TOKEN_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token.id.0)
        .bind(token.owner_id.0)
        .bind(&token.masked_last4)
        .bind(&token.brand)
        .bind(&token.encrypted_payload)
        .bind(status)
        .bind(token.created_at)
        .bind(token.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_token(&row)
    }

    async fn get(&self, token_id: PaymentTokenId) -> RepoResult<PaymentToken> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM payment_tokens WHERE id = $1"
        ))
        .bind(token_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_token(&row)
    }

    async fn list_for_owner(&self, owner_id: UserId) -> RepoResult<Vec<PaymentToken>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM payment_tokens \
             WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_token).collect()
    }

    async fn mark_revoked(
        &self,
        token_id: PaymentTokenId,
        owner_id: UserId,
    ) -> RepoResult<PaymentToken> {
        let row = sqlx::query(&format!(
            "UPDATE payment_tokens SET status = 'revoked', updated_at = $3 \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token_id.0)
        .bind(owner_id.0)
        .bind(chrono::Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        // Ownership mismatch is indistinguishable from absence.
        row.as_ref().map(row_to_token).transpose()?.ok_or(RepoError::NotFound)
    }
}
