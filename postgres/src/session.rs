//! PostgreSQL device session store.

use crate::error::{corrupt, map_sqlx};
use chrono::{DateTime, Utc};
use sokoni_core::ids::{DeviceId, SessionId, UserId};
use sokoni_core::model::{BiometricType, DeviceSession, Platform};
use sokoni_core::repository::SessionStore;
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

/// PostgreSQL-backed [`SessionStore`].
///
/// The rotation compare-and-set is a conditional `UPDATE` keyed on the
/// stored hash, which PostgreSQL serializes per row — exactly one of two
/// concurrent refreshes can win.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, device_id, device_name, platform, app_version, \
     ip_address, user_agent, refresh_token_hash, is_active, biometric_enabled, biometric_type, \
     last_activity, created_at, revoked_at";

fn row_to_session(row: &PgRow) -> RepoResult<DeviceSession> {
    let platform_raw: String = row.try_get("platform").map_err(map_sqlx)?;
    let platform =
        Platform::parse(&platform_raw).ok_or_else(|| corrupt("platform", &platform_raw))?;
    let biometric_raw: Option<String> = row.try_get("biometric_type").map_err(map_sqlx)?;
    let biometric_type = match biometric_raw.as_deref() {
        None => None,
        Some("fingerprint") => Some(BiometricType::Fingerprint),
        Some("face") => Some(BiometricType::Face),
        Some(other) => return Err(corrupt("biometric_type", other)),
    };
    Ok(DeviceSession {
        id: SessionId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        device_id: DeviceId::new(row.try_get::<String, _>("device_id").map_err(map_sqlx)?),
        device_name: row.try_get("device_name").map_err(map_sqlx)?,
        platform,
        app_version: row.try_get("app_version").map_err(map_sqlx)?,
        ip_address: row.try_get("ip_address").map_err(map_sqlx)?,
        user_agent: row.try_get("user_agent").map_err(map_sqlx)?,
        refresh_token_hash: row.try_get("refresh_token_hash").map_err(map_sqlx)?,
        is_active: row.try_get("is_active").map_err(map_sqlx)?,
        biometric_enabled: row.try_get("biometric_enabled").map_err(map_sqlx)?,
        biometric_type,
        last_activity: row.try_get("last_activity").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        revoked_at: row.try_get("revoked_at").map_err(map_sqlx)?,
    })
}

const fn biometric_tag(b: BiometricType) -> &'static str {
    match b {
        BiometricType::Fingerprint => "fingerprint",
        BiometricType::Face => "face",
    }
}

impl SessionStore for PostgresSessionStore {
    async fn create(&self, session: &DeviceSession) -> RepoResult<DeviceSession> {
        let row = sqlx::query(&format!(
            "INSERT INTO device_sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(session.device_id.as_str())
        .bind(&session.device_name)
        .bind(session.platform.as_str())
        .bind(&session.app_version)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.refresh_token_hash)
        .bind(session.is_active)
        .bind(session.biometric_enabled)
        .bind(session.biometric_type.map(biometric_tag))
        .bind(session.last_activity)
        .bind(session.created_at)
        .bind(session.revoked_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_session(&row)
    }

    async fn get(&self, session_id: SessionId) -> RepoResult<DeviceSession> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM device_sessions WHERE id = $1"
        ))
        .bind(session_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_session(&row)
    }

    async fn find_active_by_device(
        &self,
        device_id: &DeviceId,
    ) -> RepoResult<Option<DeviceSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM device_sessions \
             WHERE device_id = $1 AND is_active \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn rotate_refresh_token(
        &self,
        session_id: SessionId,
        old_hash: &str,
        new_hash: &str,
    ) -> RepoResult<DeviceSession> {
        let row = sqlx::query(&format!(
            "UPDATE device_sessions SET refresh_token_hash = $3, last_activity = $4 \
             WHERE id = $1 AND is_active AND refresh_token_hash = $2 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id.0)
        .bind(old_hash)
        .bind(new_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => row_to_session(&row),
            None => {
                let current = self.get(session_id).await?;
                if current.is_active {
                    Err(RepoError::VersionConflict)
                } else {
                    Err(RepoError::NotFound)
                }
            }
        }
    }

    async fn revoke(&self, session_id: SessionId) -> RepoResult<DeviceSession> {
        let row = sqlx::query(&format!(
            "UPDATE device_sessions \
             SET is_active = FALSE, refresh_token_hash = NULL, revoked_at = $2 \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_session(&row)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> RepoResult<Vec<SessionId>> {
        let rows = sqlx::query(
            "UPDATE device_sessions \
             SET is_active = FALSE, refresh_token_hash = NULL, revoked_at = $2 \
             WHERE user_id = $1 AND is_active \
             RETURNING id",
        )
        .bind(user_id.0)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map(SessionId::from_uuid)
                    .map_err(map_sqlx)
            })
            .collect()
    }

    async fn list_for_user(&self, user_id: UserId) -> RepoResult<Vec<DeviceSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM device_sessions \
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_session).collect()
    }

    async fn touch(&self, session_id: SessionId, at: DateTime<Utc>) -> RepoResult<()> {
        let result = sqlx::query("UPDATE device_sessions SET last_activity = $2 WHERE id = $1")
            .bind(session_id.0)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_biometric(
        &self,
        session_id: SessionId,
        biometric: Option<BiometricType>,
    ) -> RepoResult<DeviceSession> {
        let row = sqlx::query(&format!(
            "UPDATE device_sessions SET biometric_enabled = $2, biometric_type = $3 \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id.0)
        .bind(biometric.is_some())
        .bind(biometric.map(biometric_tag))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_session(&row)
    }
}
