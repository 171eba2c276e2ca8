//! PostgreSQL user store.

use crate::error::{corrupt, map_sqlx};
use chrono::{DateTime, Utc};
use sokoni_core::ids::UserId;
use sokoni_core::model::{normalize_email, Address, User, UserRole};
use sokoni_core::money::Money;
use sokoni_core::repository::UserStore;
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// PostgreSQL-backed [`UserStore`].
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, phone, first_name, last_name, password_hash, role, \
     email_verified, profile_image, address, wallet_balance, wallet_currency, last_sync_at, \
     is_offline, version, deleted_at, created_at, updated_at";

fn row_to_user(row: &PgRow) -> RepoResult<User> {
    let role_raw: String = row.try_get("role").map_err(map_sqlx)?;
    let role = UserRole::parse(&role_raw).ok_or_else(|| corrupt("role", &role_raw))?;
    let address: Option<String> = row.try_get("address").map_err(map_sqlx)?;
    let address = match address {
        Some(raw) => Some(
            serde_json::from_str::<Address>(&raw).map_err(|_| corrupt("address", &raw))?,
        ),
        None => None,
    };
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        email: row.try_get("email").map_err(map_sqlx)?,
        phone: row.try_get("phone").map_err(map_sqlx)?,
        first_name: row.try_get("first_name").map_err(map_sqlx)?,
        last_name: row.try_get("last_name").map_err(map_sqlx)?,
        password_hash: row.try_get("password_hash").map_err(map_sqlx)?,
        role,
        email_verified: row.try_get("email_verified").map_err(map_sqlx)?,
        profile_image: row.try_get("profile_image").map_err(map_sqlx)?,
        address,
        wallet_balance: Money::from_minor(row.try_get("wallet_balance").map_err(map_sqlx)?),
        wallet_currency: row.try_get("wallet_currency").map_err(map_sqlx)?,
        last_sync_at: row.try_get("last_sync_at").map_err(map_sqlx)?,
        is_offline: row.try_get("is_offline").map_err(map_sqlx)?,
        version: row.try_get::<i64, _>("version").map_err(map_sqlx)? as u64,
        deleted_at: row.try_get("deleted_at").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
    })
}

impl UserStore for PostgresUserStore {
    async fn create(&self, user: &User) -> RepoResult<User> {
        let email = normalize_email(&user.email);
        let address = user
            .address
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepoError::PermanentIo(format!("serialize address: {e}")))?;
        let row = sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.0)
        .bind(&email)
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(&user.profile_image)
        .bind(address)
        .bind(user.wallet_balance.minor())
        .bind(&user.wallet_currency)
        .bind(user.last_sync_at)
        .bind(user.is_offline)
        .bind(user.version as i64)
        .bind(user.deleted_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_user(&row)
    }

    async fn get(&self, user_id: UserId) -> RepoResult<User> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row_to_user(&row)
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<User> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_user(&row)
    }

    async fn update(&self, user: &User) -> RepoResult<User> {
        let address = user
            .address
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepoError::PermanentIo(format!("serialize address: {e}")))?;
        let row = sqlx::query(&format!(
            "UPDATE users SET phone = $2, first_name = $3, last_name = $4, role = $5, \
             email_verified = $6, profile_image = $7, address = $8, is_offline = $9, \
             version = version + 1, updated_at = $10 \
             WHERE id = $1 AND version = $11 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.0)
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(&user.profile_image)
        .bind(address)
        .bind(user.is_offline)
        .bind(Utc::now())
        .bind(user.version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => row_to_user(&row),
            None => {
                // Distinguish a missing row from a lost race.
                self.get(user.id).await?;
                Err(RepoError::VersionConflict)
            }
        }
    }

    async fn update_password(
        &self,
        user_id: UserId,
        new_hash: &str,
        expected_version: u64,
    ) -> RepoResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET password_hash = $2, version = version + 1, updated_at = $3 \
             WHERE id = $1 AND version = $4 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id.0)
        .bind(new_hash)
        .bind(Utc::now())
        .bind(expected_version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => row_to_user(&row),
            None => {
                self.get(user_id).await?;
                Err(RepoError::VersionConflict)
            }
        }
    }

    async fn set_wallet_snapshot(
        &self,
        user_id: UserId,
        balance: Money,
        currency: &str,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE users SET wallet_balance = $2, wallet_currency = $3, \
             last_sync_at = COALESCE($4, last_sync_at), updated_at = $5 \
             WHERE id = $1",
        )
        .bind(user_id.0)
        .bind(balance.minor())
        .bind(currency)
        .bind(last_sync_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_sync_state(
        &self,
        user_id: UserId,
        last_sync_at: DateTime<Utc>,
        is_offline: bool,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE users SET last_sync_at = $2, is_offline = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(user_id.0)
        .bind(last_sync_at)
        .bind(is_offline)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, user_id: UserId) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(user_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
