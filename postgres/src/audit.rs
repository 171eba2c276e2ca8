//! PostgreSQL audit store.

use crate::error::{corrupt, map_sqlx};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sokoni_core::audit::{AuditAction, AuditActor, AuditEntry, AuditResource};
use sokoni_core::ids::{AuditEntryId, UserId};
use sokoni_core::model::UserRole;
use sokoni_core::repository::AuditStore;
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};
use std::collections::BTreeMap;

/// PostgreSQL-backed [`AuditStore`]. Append-only by construction: the
/// store exposes no update or delete statement.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const AUDIT_COLUMNS: &str = "id, ts, actor_user, actor_email, actor_role, action, resource, \
     resource_id, client_ip, user_agent, success, detail, error";

fn action_from_tag(raw: &str) -> RepoResult<AuditAction> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| corrupt("action", raw))
}

fn resource_from_tag(raw: &str) -> RepoResult<AuditResource> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| corrupt("resource", raw))
}

fn row_to_entry(row: &PgRow) -> RepoResult<AuditEntry> {
    let action_raw: String = row.try_get("action").map_err(map_sqlx)?;
    let resource_raw: String = row.try_get("resource").map_err(map_sqlx)?;
    let role_raw: Option<String> = row.try_get("actor_role").map_err(map_sqlx)?;
    let detail_raw: String = row.try_get("detail").map_err(map_sqlx)?;
    let detail: BTreeMap<String, Value> =
        serde_json::from_str(&detail_raw).map_err(|_| corrupt("detail", &detail_raw))?;
    Ok(AuditEntry {
        id: AuditEntryId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        timestamp: row.try_get("ts").map_err(map_sqlx)?,
        actor: AuditActor {
            user_id: row
                .try_get::<Option<uuid::Uuid>, _>("actor_user")
                .map_err(map_sqlx)?
                .map(UserId::from_uuid),
            email: row.try_get("actor_email").map_err(map_sqlx)?,
            role: role_raw.as_deref().and_then(UserRole::parse),
        },
        action: action_from_tag(&action_raw)?,
        resource: resource_from_tag(&resource_raw)?,
        resource_id: row.try_get("resource_id").map_err(map_sqlx)?,
        client_ip: row.try_get("client_ip").map_err(map_sqlx)?,
        user_agent: row.try_get("user_agent").map_err(map_sqlx)?,
        success: row.try_get("success").map_err(map_sqlx)?,
        detail,
        error: row.try_get("error").map_err(map_sqlx)?,
    })
}

impl AuditStore for PostgresAuditStore {
    async fn append(&self, entry: &AuditEntry) -> RepoResult<()> {
        let detail = serde_json::to_string(&entry.detail)
            .map_err(|e| RepoError::PermanentIo(format!("serialize detail: {e}")))?;
        sqlx::query(&format!(
            "INSERT INTO audit_log ({AUDIT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(entry.id.0)
        .bind(entry.timestamp)
        .bind(entry.actor.user_id.map(|u| u.0))
        .bind(&entry.actor.email)
        .bind(entry.actor.role.map(|r| r.as_str()))
        .bind(entry.action.as_str())
        .bind(entry.resource.as_str())
        .bind(&entry.resource_id)
        .bind(&entry.client_ip)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .bind(detail)
        .bind(&entry.error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE actor_user = $1 AND ($2::timestamptz IS NULL OR ts < $2) \
             ORDER BY ts DESC, id DESC LIMIT $3"
        ))
        .bind(user_id.0)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn list_by_action(
        &self,
        action: AuditAction,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE action = $1 AND ($2::timestamptz IS NULL OR ts < $2) \
             ORDER BY ts DESC, id DESC LIMIT $3"
        ))
        .bind(action.as_str())
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn list_by_resource(
        &self,
        resource: AuditResource,
        resource_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE resource = $1 AND resource_id = $2 \
               AND ($3::timestamptz IS NULL OR ts < $3) \
             ORDER BY ts DESC, id DESC LIMIT $4"
        ))
        .bind(resource.as_str())
        .bind(resource_id)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_entry).collect()
    }
}
