//! PostgreSQL OTP store.

use crate::error::{corrupt, map_sqlx};
use chrono::{DateTime, Utc};
use sokoni_core::model::{normalize_email, OtpPurpose, OtpRecord};
use sokoni_core::repository::OtpStore;
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// PostgreSQL-backed [`OtpStore`].
///
/// Consumption locks the candidate row (`FOR UPDATE SKIP LOCKED`) inside
/// the stamping update, so one code verifies exactly once even under
/// concurrent confirms.
#[derive(Clone)]
pub struct PostgresOtpStore {
    pool: PgPool,
}

impl PostgresOtpStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn purpose_tag(purpose: OtpPurpose) -> &'static str {
    purpose.as_str()
}

fn row_to_otp(row: &PgRow) -> RepoResult<OtpRecord> {
    let purpose_raw: String = row.try_get("purpose").map_err(map_sqlx)?;
    let purpose = match purpose_raw.as_str() {
        "password_reset" => OtpPurpose::PasswordReset,
        "verification" => OtpPurpose::Verification,
        other => return Err(corrupt("purpose", other)),
    };
    Ok(OtpRecord {
        email: row.try_get("email").map_err(map_sqlx)?,
        code: row.try_get("code").map_err(map_sqlx)?,
        purpose,
        expires_at: row.try_get("expires_at").map_err(map_sqlx)?,
        used_at: row.try_get("used_at").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

impl OtpStore for PostgresOtpStore {
    async fn create(&self, otp: &OtpRecord) -> RepoResult<OtpRecord> {
        let row = sqlx::query(
            "INSERT INTO otp_records (email, code, purpose, expires_at, used_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING email, code, purpose, expires_at, used_at, created_at",
        )
        .bind(normalize_email(&otp.email))
        .bind(&otp.code)
        .bind(purpose_tag(otp.purpose))
        .bind(otp.expires_at)
        .bind(otp.used_at)
        .bind(otp.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_otp(&row)
    }

    async fn consume(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> RepoResult<OtpRecord> {
        let row = sqlx::query(
            "UPDATE otp_records SET used_at = $4 \
             WHERE id = ( \
                 SELECT id FROM otp_records \
                 WHERE email = $1 AND code = $2 AND purpose = $3 \
                   AND used_at IS NULL AND expires_at > $4 \
                 ORDER BY created_at DESC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING email, code, purpose, expires_at, used_at, created_at",
        )
        .bind(normalize_email(email))
        .bind(code)
        .bind(purpose_tag(purpose))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => row_to_otp(&row),
            None => Err(RepoError::NotFound),
        }
    }
}
