//! PostgreSQL sync stores: checkpoints, queue, metrics, and documents.

use crate::error::{corrupt, map_sqlx};
use chrono::{DateTime, Utc};
use sokoni_core::ids::{SyncItemId, UserId};
use sokoni_core::model::{
    Collection, ConflictDescriptor, SyncCheckpoint, SyncItemType, SyncMetrics, SyncQueueItem,
    SyncQueueStatus, Watermark,
};
use sokoni_core::repository::{
    ApplyOutcome, CheckpointStore, Document, DocumentChange, DocumentStore, QueueCounts,
    SyncMetricsStore, SyncQueueStore,
};
use sokoni_core::{RepoError, RepoResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};

// ═══════════════════════════════════════════════════════════
// Checkpoints
// ═══════════════════════════════════════════════════════════

/// PostgreSQL-backed [`CheckpointStore`]: one active row per user,
/// superseded by upsert.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_checkpoint(row: &PgRow) -> RepoResult<SyncCheckpoint> {
    Ok(SyncCheckpoint {
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        checkpoint: row.try_get("checkpoint").map_err(map_sqlx)?,
        last_sync_at: row.try_get("last_sync_at").map_err(map_sqlx)?,
        version: row.try_get::<i64, _>("version").map_err(map_sqlx)? as u64,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
    })
}

impl CheckpointStore for PostgresCheckpointStore {
    async fn put_active(&self, checkpoint: &SyncCheckpoint) -> RepoResult<SyncCheckpoint> {
        let row = sqlx::query(
            "INSERT INTO sync_checkpoints \
                 (user_id, checkpoint, last_sync_at, version, created_at, updated_at) \
             VALUES ($1, $2, $3, 1, $4, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 checkpoint = EXCLUDED.checkpoint, \
                 last_sync_at = EXCLUDED.last_sync_at, \
                 version = sync_checkpoints.version + 1, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING user_id, checkpoint, last_sync_at, version, created_at, updated_at",
        )
        .bind(checkpoint.user_id.0)
        .bind(&checkpoint.checkpoint)
        .bind(checkpoint.last_sync_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_checkpoint(&row)
    }

    async fn get_active(&self, user_id: UserId) -> RepoResult<Option<SyncCheckpoint>> {
        let row = sqlx::query(
            "SELECT user_id, checkpoint, last_sync_at, version, created_at, updated_at \
             FROM sync_checkpoints WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_checkpoint).transpose()
    }

    async fn delete_for_user(&self, user_id: UserId) -> RepoResult<()> {
        sqlx::query("DELETE FROM sync_checkpoints WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Queue
// ═══════════════════════════════════════════════════════════

/// PostgreSQL-backed [`SyncQueueStore`].
///
/// Claiming uses `FOR UPDATE SKIP LOCKED` inside the status-flipping
/// update, so concurrent claimers partition the runnable set instead of
/// colliding on it.
#[derive(Clone)]
pub struct PostgresSyncQueueStore {
    pool: PgPool,
}

impl PostgresSyncQueueStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ITEM_COLUMNS: &str = "id, user_id, item_type, status, priority, data, conflict, \
     retry_count, max_retries, next_retry_at, last_attempt_at, last_error, processing_node, \
     created_at, updated_at, completed_at";

fn item_type_tag(t: SyncItemType) -> &'static str {
    match t {
        SyncItemType::Upload => "upload",
        SyncItemType::Download => "download",
        SyncItemType::ConflictResolution => "conflict_resolution",
    }
}

fn status_tag(s: SyncQueueStatus) -> &'static str {
    match s {
        SyncQueueStatus::Pending => "pending",
        SyncQueueStatus::Processing => "processing",
        SyncQueueStatus::Completed => "completed",
        SyncQueueStatus::Failed => "failed",
        SyncQueueStatus::Retrying => "retrying",
        SyncQueueStatus::Cancelled => "cancelled",
    }
}

fn row_to_item(row: &PgRow) -> RepoResult<SyncQueueItem> {
    let type_raw: String = row.try_get("item_type").map_err(map_sqlx)?;
    let item_type = match type_raw.as_str() {
        "upload" => SyncItemType::Upload,
        "download" => SyncItemType::Download,
        "conflict_resolution" => SyncItemType::ConflictResolution,
        other => return Err(corrupt("item_type", other)),
    };
    let status_raw: String = row.try_get("status").map_err(map_sqlx)?;
    let status = match status_raw.as_str() {
        "pending" => SyncQueueStatus::Pending,
        "processing" => SyncQueueStatus::Processing,
        "completed" => SyncQueueStatus::Completed,
        "failed" => SyncQueueStatus::Failed,
        "retrying" => SyncQueueStatus::Retrying,
        "cancelled" => SyncQueueStatus::Cancelled,
        other => return Err(corrupt("status", other)),
    };
    let data_raw: String = row.try_get("data").map_err(map_sqlx)?;
    let data = serde_json::from_str(&data_raw).map_err(|_| corrupt("data", &data_raw))?;
    let conflict_raw: Option<String> = row.try_get("conflict").map_err(map_sqlx)?;
    let conflict = match conflict_raw {
        Some(raw) => Some(
            serde_json::from_str::<ConflictDescriptor>(&raw)
                .map_err(|_| corrupt("conflict", &raw))?,
        ),
        None => None,
    };
    Ok(SyncQueueItem {
        id: SyncItemId::from_uuid(row.try_get("id").map_err(map_sqlx)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        item_type,
        status,
        priority: row.try_get("priority").map_err(map_sqlx)?,
        data,
        conflict,
        retry_count: row.try_get::<i32, _>("retry_count").map_err(map_sqlx)? as u32,
        max_retries: row.try_get::<i32, _>("max_retries").map_err(map_sqlx)? as u32,
        next_retry_at: row.try_get("next_retry_at").map_err(map_sqlx)?,
        last_attempt_at: row.try_get("last_attempt_at").map_err(map_sqlx)?,
        last_error: row.try_get("last_error").map_err(map_sqlx)?,
        processing_node: row.try_get("processing_node").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        completed_at: row.try_get("completed_at").map_err(map_sqlx)?,
    })
}

fn serialize_json<T: serde::Serialize>(value: &T, what: &str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|e| RepoError::PermanentIo(format!("serialize {what}: {e}")))
}

impl SyncQueueStore for PostgresSyncQueueStore {
    async fn enqueue(&self, item: &SyncQueueItem) -> RepoResult<SyncQueueItem> {
        let data = serialize_json(&item.data, "item data")?;
        let conflict = item
            .conflict
            .as_ref()
            .map(|c| serialize_json(c, "conflict descriptor"))
            .transpose()?;
        let row = sqlx::query(&format!(
            "INSERT INTO sync_queue ({ITEM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.id.0)
        .bind(item.user_id.0)
        .bind(item_type_tag(item.item_type))
        .bind(status_tag(item.status))
        .bind(item.priority)
        .bind(data)
        .bind(conflict)
        .bind(item.retry_count as i32)
        .bind(item.max_retries as i32)
        .bind(item.next_retry_at)
        .bind(item.last_attempt_at)
        .bind(&item.last_error)
        .bind(&item.processing_node)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_item(&row)
    }

    async fn claim_pending(
        &self,
        node_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<SyncQueueItem>> {
        let rows = sqlx::query(&format!(
            "UPDATE sync_queue \
             SET status = 'processing', processing_node = $1, last_attempt_at = $2, \
                 updated_at = $2 \
             WHERE id IN ( \
                 SELECT id FROM sync_queue \
                 WHERE status IN ('pending', 'retrying') AND next_retry_at <= $2 \
                 ORDER BY priority DESC, created_at ASC \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(node_id)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let mut items: Vec<SyncQueueItem> = rows
            .iter()
            .map(row_to_item)
            .collect::<RepoResult<Vec<_>>>()?;
        // RETURNING does not preserve the selection order.
        items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(items)
    }

    async fn complete(&self, item_id: SyncItemId, now: DateTime<Utc>) -> RepoResult<SyncQueueItem> {
        let row = sqlx::query(&format!(
            "UPDATE sync_queue \
             SET status = 'completed', completed_at = $2, processing_node = NULL, updated_at = $2 \
             WHERE id = $1 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id.0)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_item(&row)
    }

    async fn fail(
        &self,
        item_id: SyncItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<SyncQueueItem> {
        let row = sqlx::query(&format!(
            "UPDATE sync_queue \
             SET status = 'failed', last_error = $2, processing_node = NULL, updated_at = $3 \
             WHERE id = $1 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id.0)
        .bind(error)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_item(&row)
    }

    async fn mark_for_retry(
        &self,
        item_id: SyncItemId,
        error: &str,
        next_retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepoResult<SyncQueueItem> {
        let row = sqlx::query(&format!(
            "UPDATE sync_queue \
             SET status = 'retrying', retry_count = retry_count + 1, last_error = $2, \
                 next_retry_at = $3, processing_node = NULL, updated_at = $4 \
             WHERE id = $1 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id.0)
        .bind(error)
        .bind(next_retry_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row_to_item(&row)
    }

    async fn get(&self, item_id: SyncItemId) -> RepoResult<SyncQueueItem> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM sync_queue WHERE id = $1"))
            .bind(item_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row_to_item(&row)
    }

    async fn update(&self, item: &SyncQueueItem) -> RepoResult<SyncQueueItem> {
        let data = serialize_json(&item.data, "item data")?;
        let conflict = item
            .conflict
            .as_ref()
            .map(|c| serialize_json(c, "conflict descriptor"))
            .transpose()?;
        let row = sqlx::query(&format!(
            "UPDATE sync_queue \
             SET status = $2, priority = $3, data = $4, conflict = $5, \
                 next_retry_at = $6, processing_node = $7, updated_at = $8 \
             WHERE id = $1 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.id.0)
        .bind(status_tag(item.status))
        .bind(item.priority)
        .bind(data)
        .bind(conflict)
        .bind(item.next_retry_at)
        .bind(&item.processing_node)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_item).transpose()?.ok_or(RepoError::NotFound)
    }

    async fn counts_for_user(&self, user_id: UserId) -> RepoResult<QueueCounts> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) FILTER (WHERE status IN ('pending', 'retrying')) AS pending, \
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed \
             FROM sync_queue WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(QueueCounts {
            pending: row.try_get::<i64, _>("pending").map_err(map_sqlx)? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(map_sqlx)? as u64,
        })
    }

    async fn sweep_completed(&self, older_than: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sync_queue WHERE status = 'completed' AND completed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

// ═══════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════

/// PostgreSQL-backed [`SyncMetricsStore`].
#[derive(Clone)]
pub struct PostgresSyncMetricsStore {
    pool: PgPool,
}

impl PostgresSyncMetricsStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_metrics(row: &PgRow) -> RepoResult<SyncMetrics> {
    Ok(SyncMetrics {
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        duration_ms: row.try_get::<i64, _>("duration_ms").map_err(map_sqlx)? as u64,
        bytes_raw: row.try_get::<i64, _>("bytes_raw").map_err(map_sqlx)? as u64,
        bytes_compressed: row.try_get::<i64, _>("bytes_compressed").map_err(map_sqlx)? as u64,
        records_moved: row.try_get::<i64, _>("records_moved").map_err(map_sqlx)? as u64,
        success: row.try_get("success").map_err(map_sqlx)?,
        error: row.try_get("error").map_err(map_sqlx)?,
        network_type: row.try_get("network_type").map_err(map_sqlx)?,
        connection_quality: row.try_get("connection_quality").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

impl SyncMetricsStore for PostgresSyncMetricsStore {
    async fn record(&self, metrics: &SyncMetrics) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO sync_metrics \
                 (user_id, duration_ms, bytes_raw, bytes_compressed, records_moved, success, \
                  error, network_type, connection_quality, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(metrics.user_id.0)
        .bind(metrics.duration_ms as i64)
        .bind(metrics.bytes_raw as i64)
        .bind(metrics.bytes_compressed as i64)
        .bind(metrics.records_moved as i64)
        .bind(metrics.success)
        .bind(&metrics.error)
        .bind(&metrics.network_type)
        .bind(&metrics.connection_quality)
        .bind(metrics.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> RepoResult<Vec<SyncMetrics>> {
        let rows = sqlx::query(
            "SELECT user_id, duration_ms, bytes_raw, bytes_compressed, records_moved, success, \
                    error, network_type, connection_quality, created_at \
             FROM sync_metrics WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_metrics).collect()
    }

    async fn sweep(&self, older_than: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM sync_metrics WHERE created_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

// ═══════════════════════════════════════════════════════════
// Documents
// ═══════════════════════════════════════════════════════════

/// PostgreSQL-backed [`DocumentStore`] over the syncable collections.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &PgRow) -> RepoResult<Document> {
    let collection_raw: String = row.try_get("collection").map_err(map_sqlx)?;
    let collection = Collection::parse(&collection_raw)
        .ok_or_else(|| corrupt("collection", &collection_raw))?;
    let data_raw: String = row.try_get("data").map_err(map_sqlx)?;
    let data = serde_json::from_str(&data_raw).map_err(|_| corrupt("data", &data_raw))?;
    Ok(Document {
        collection,
        id: row.try_get("id").map_err(map_sqlx)?,
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_sqlx)?),
        version: row.try_get::<i64, _>("version").map_err(map_sqlx)? as u64,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        data,
    })
}

impl DocumentStore for PostgresDocumentStore {
    async fn changes_since(
        &self,
        user_id: UserId,
        collection: Collection,
        watermark: &Watermark,
        limit: usize,
    ) -> RepoResult<Vec<Document>> {
        // Strictly above the (updated_at, id) pair, in delivery order.
        let mark_time = chrono::TimeZone::timestamp_micros(&Utc, watermark.updated_at_micros)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let rows = sqlx::query(
            "SELECT collection, id, user_id, version, updated_at, data \
             FROM sync_documents \
             WHERE user_id = $1 AND collection = $2 \
               AND (updated_at > $3 OR (updated_at = $3 AND id > $4)) \
             ORDER BY updated_at ASC, id ASC \
             LIMIT $5",
        )
        .bind(user_id.0)
        .bind(collection.as_str())
        .bind(mark_time)
        .bind(&watermark.last_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn get(&self, collection: Collection, id: &str) -> RepoResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT collection, id, user_id, version, updated_at, data \
             FROM sync_documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn apply(&self, change: &DocumentChange, now: DateTime<Utc>) -> RepoResult<ApplyOutcome> {
        let data = serialize_json(&change.data, "document data")?;

        if change.expected_version == 0 {
            let row = sqlx::query(
                "INSERT INTO sync_documents (collection, id, user_id, version, updated_at, data) \
                 VALUES ($1, $2, $3, 1, $4, $5) \
                 ON CONFLICT (collection, id) DO NOTHING \
                 RETURNING collection, id, user_id, version, updated_at, data",
            )
            .bind(change.collection.as_str())
            .bind(&change.id)
            .bind(change.user_id.0)
            .bind(now)
            .bind(&data)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
            return match row {
                Some(row) => Ok(ApplyOutcome::Applied(row_to_document(&row)?)),
                None => Ok(ApplyOutcome::Conflict {
                    server: self.get(change.collection, &change.id).await?,
                }),
            };
        }

        let row = sqlx::query(
            "UPDATE sync_documents \
             SET version = version + 1, updated_at = $4, data = $5 \
             WHERE collection = $1 AND id = $2 AND version = $3 \
             RETURNING collection, id, user_id, version, updated_at, data",
        )
        .bind(change.collection.as_str())
        .bind(&change.id)
        .bind(change.expected_version as i64)
        .bind(now)
        .bind(&data)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => Ok(ApplyOutcome::Applied(row_to_document(&row)?)),
            None => Ok(ApplyOutcome::Conflict {
                server: self.get(change.collection, &change.id).await?,
            }),
        }
    }
}
