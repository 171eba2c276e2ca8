//! Sync core: checkpointed pull, chunked pull, push, status, and conflict
//! resolution.

use crate::checkpoint::{
    decode_checkpoint, decode_resume_token, encode_checkpoint, encode_resume_token, ResumeCursor,
    WatermarkMap,
};
use crate::compress::gzip_base64;
use crate::config::{SyncConfig, MAX_PULL_LIMIT, MAX_WINDOW_ROWS};
use crate::error::{Result, SyncError};
use crate::types::{
    AppliedMutation, ChangeSet, ChunkedPullRequest, ChunkedPullResponse, CollectionData,
    ConflictReport, PullRequest, PullResponse, PushOutcome, RecordMutation,
};
use chrono::Utc;
use serde_json::Value;
use sokoni_core::audit::{AuditAction, AuditActor, AuditEntry, AuditResource};
use sokoni_core::ids::{SyncItemId, UserId};
use sokoni_core::model::{
    Collection, ConflictDescriptor, ConflictType, ResolutionStrategy, SyncItemType, SyncMetrics,
    SyncQueueItem, SyncQueueStatus, SyncStatus, Watermark,
};
use sokoni_core::repository::{
    ApplyOutcome, AuditStore, CheckpointStore, Document, DocumentChange, DocumentStore,
    SyncMetricsStore, SyncQueueStore, UserStore,
};
use sokoni_core::{AuditRecorder, RepoError};

/// The sync core.
///
/// Generic over its stores; `Clone` shares the underlying handles, which
/// is how the queue supervisor hands one core to every worker.
#[derive(Clone)]
pub struct SyncCore<D, Q, C, M, U, A>
where
    D: DocumentStore + Clone,
    Q: SyncQueueStore + Clone,
    C: CheckpointStore + Clone,
    M: SyncMetricsStore + Clone,
    U: UserStore + Clone,
    A: AuditStore + Clone,
{
    documents: D,
    queue: Q,
    checkpoints: C,
    metrics: M,
    users: U,
    audit: AuditRecorder<A>,
    config: SyncConfig,
}

/// What happened to a queue item a worker processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Work done; caller marks the item completed.
    Completed,

    /// The item finalized itself (conflict resolution completes its own
    /// row).
    Finalized,

    /// Manual conflict still awaiting a user decision; re-queued at low
    /// priority.
    Deferred,
}

impl<D, Q, C, M, U, A> SyncCore<D, Q, C, M, U, A>
where
    D: DocumentStore + Clone,
    Q: SyncQueueStore + Clone,
    C: CheckpointStore + Clone,
    M: SyncMetricsStore + Clone,
    U: UserStore + Clone,
    A: AuditStore + Clone,
{
    /// Wire the core together.
    pub fn new(
        config: SyncConfig,
        documents: D,
        queue: Q,
        checkpoints: C,
        metrics: M,
        users: U,
        audit: AuditRecorder<A>,
    ) -> Self {
        Self {
            documents,
            queue,
            checkpoints,
            metrics,
            users,
            audit,
            config,
        }
    }

    /// Borrow the config (the queue supervisor reads its tuning here).
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════
    // Pull
    // ═══════════════════════════════════════════════════════════

    /// Checkpointed delta pull. Records a metrics row whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// `InvalidCheckpoint` on an undecodable checkpoint; store failures.
    pub async fn pull(&self, req: PullRequest) -> Result<PullResponse> {
        let started = std::time::Instant::now();
        let result = self.pull_inner(&req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = result.map(|mut resp| {
            resp.sync_duration_ms = elapsed_ms;
            resp
        });

        let row = match &result {
            Ok(resp) => SyncMetrics {
                user_id: req.user_id,
                duration_ms: elapsed_ms,
                bytes_raw: resp.data_size as u64,
                bytes_compressed: resp.compressed_size as u64,
                records_moved: resp.records_count as u64,
                success: true,
                error: None,
                network_type: req.network_type.clone().unwrap_or_else(|| "unknown".into()),
                connection_quality: req
                    .connection_quality
                    .clone()
                    .unwrap_or_else(|| "unknown".into()),
                created_at: Utc::now(),
            },
            Err(e) => SyncMetrics {
                user_id: req.user_id,
                duration_ms: elapsed_ms,
                bytes_raw: 0,
                bytes_compressed: 0,
                records_moved: 0,
                success: false,
                error: Some(e.to_string()),
                network_type: req.network_type.clone().unwrap_or_else(|| "unknown".into()),
                connection_quality: req
                    .connection_quality
                    .clone()
                    .unwrap_or_else(|| "unknown".into()),
                created_at: Utc::now(),
            },
        };
        if let Err(e) = self.metrics.record(&row).await {
            tracing::warn!(error = %e, "Failed to record sync metrics");
        }

        result
    }

    async fn pull_inner(&self, req: &PullRequest) -> Result<PullResponse> {
        let limit = self.config.clamp_limit(req.limit);
        let mut marks = self.resolve_start_marks(req.checkpoint.as_deref(), req.last_sync_at)?;

        let mut data = CollectionData::new();
        let mut records_count = 0usize;
        let mut has_more = false;

        for collection in Collection::ALL {
            let start = marks.get(&collection).cloned().unwrap_or_default();
            let rows = self
                .documents
                .changes_since(req.user_id, collection, &start, limit)
                .await?;
            if rows.len() == limit {
                has_more = true;
            }
            if let Some(last) = rows.last() {
                marks.insert(
                    collection,
                    Watermark {
                        updated_at_micros: last.updated_at.timestamp_micros(),
                        last_id: last.id.clone(),
                    },
                );
            }
            records_count += rows.len();
            if !rows.is_empty() {
                data.insert(collection.as_str().to_string(), rows);
            }
        }

        let now = Utc::now();
        let checkpoint = encode_checkpoint(&marks);
        self.persist_checkpoint(req.user_id, &checkpoint, now).await?;
        self.users.set_sync_state(req.user_id, now, false).await?;

        let body = serde_json::to_vec(&data)
            .map_err(|e| SyncError::Internal(format!("serialize pull body: {e}")))?;
        let data_size = body.len();

        let (data, compressed_blob, compressed_size) = if req.compression {
            let (blob, size) = gzip_base64(&body)?;
            (None, Some(blob), size)
        } else {
            (Some(data), None, data_size)
        };

        self.audit
            .record(
                AuditEntry::builder(AuditAction::SyncPull, AuditResource::SyncCheckpoint)
                    .actor(AuditActor {
                        user_id: Some(req.user_id),
                        email: None,
                        role: None,
                    })
                    .detail("records", records_count as u64)
                    .detail("has_more", has_more)
                    .build(),
            )
            .await;

        Ok(PullResponse {
            data,
            compressed_blob,
            checkpoint,
            last_sync_at: now,
            has_more,
            compressed: req.compression,
            data_size,
            compressed_size,
            records_count,
            sync_duration_ms: 0,
        })
    }

    /// Chunked pull bound to a frozen snapshot window.
    ///
    /// Chunk 0 opens the window (checkpoint → lower bound, now → upper
    /// bound) and returns a resume token; later chunks present the token
    /// so rows written meanwhile cannot interleave.
    ///
    /// # Errors
    ///
    /// `InvalidCheckpoint` on a bad token; `InvalidInput` when the token
    /// belongs to another user or the chunk is out of range.
    pub async fn pull_chunked(&self, req: ChunkedPullRequest) -> Result<ChunkedPullResponse> {
        let chunk_size = req.chunk_size.clamp(1, MAX_PULL_LIMIT);

        let cursor = match &req.resume_token {
            Some(token) => {
                let cursor = decode_resume_token(token)?;
                if cursor.user_id != req.user_id {
                    return Err(SyncError::InvalidInput(
                        "resume token belongs to another user".into(),
                    ));
                }
                cursor
            }
            None => ResumeCursor {
                user_id: req.user_id,
                lower: self.resolve_start_marks(req.checkpoint.as_deref(), None)?,
                upper: Watermark {
                    updated_at_micros: Utc::now().timestamp_micros(),
                    last_id: String::new(),
                },
                issued_at: Utc::now(),
            },
        };

        // Enumerate the window, collection-major, each collection in
        // (updated_at, id) order.
        let mut window: Vec<Document> = Vec::new();
        for collection in Collection::ALL {
            let start = cursor.lower.get(&collection).cloned().unwrap_or_default();
            let rows = self
                .documents
                .changes_since(req.user_id, collection, &start, MAX_WINDOW_ROWS)
                .await?;
            window.extend(
                rows.into_iter()
                    .filter(|d| d.updated_at.timestamp_micros() <= cursor.upper.updated_at_micros),
            );
        }

        let total = window.len();
        let total_chunks = ((total + chunk_size - 1) / chunk_size).max(1) as u32;
        let from = (req.chunk_index as usize).saturating_mul(chunk_size);
        let to = from.saturating_add(chunk_size).min(total);
        let has_more = to < total;

        let mut data = CollectionData::new();
        if from < total {
            for doc in &window[from..to] {
                data.entry(doc.collection.as_str().to_string())
                    .or_default()
                    .push(doc.clone());
            }
        }

        // The final chunk settles the checkpoint for the whole window.
        let checkpoint = if has_more {
            None
        } else {
            let mut marks = cursor.lower.clone();
            for doc in &window {
                let mark = Watermark {
                    updated_at_micros: doc.updated_at.timestamp_micros(),
                    last_id: doc.id.clone(),
                };
                let entry = marks.entry(doc.collection).or_default();
                if mark > *entry {
                    *entry = mark;
                }
            }
            let encoded = encode_checkpoint(&marks);
            let now = Utc::now();
            self.persist_checkpoint(req.user_id, &encoded, now).await?;
            self.users.set_sync_state(req.user_id, now, false).await?;
            Some(encoded)
        };

        Ok(ChunkedPullResponse {
            data,
            has_more,
            next_chunk: req.chunk_index + 1,
            resume_token: encode_resume_token(&cursor),
            total_chunks,
            checkpoint,
        })
    }

    fn resolve_start_marks(
        &self,
        checkpoint: Option<&str>,
        last_sync_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<WatermarkMap> {
        // The checkpoint is authoritative when both are present.
        if let Some(encoded) = checkpoint {
            return decode_checkpoint(encoded);
        }
        let mut marks = WatermarkMap::new();
        if let Some(at) = last_sync_at {
            for collection in Collection::ALL {
                marks.insert(collection, Watermark::from_time(at));
            }
        }
        Ok(marks)
    }

    async fn persist_checkpoint(
        &self,
        user_id: UserId,
        encoded: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        self.checkpoints
            .put_active(&sokoni_core::model::SyncCheckpoint {
                user_id,
                checkpoint: encoded.to_string(),
                last_sync_at: now,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Push
    // ═══════════════════════════════════════════════════════════

    /// Apply a batch of offline mutations. Version mismatches become
    /// conflict queue items; the rest of the batch continues.
    ///
    /// # Errors
    ///
    /// Store failures. Individual conflicts are outcomes, not errors.
    pub async fn push(&self, user_id: UserId, changes: ChangeSet) -> Result<PushOutcome> {
        let now = Utc::now();
        let mut applied = Vec::new();
        let mut conflicts = Vec::new();

        for (collection, mutations) in changes {
            for mutation in mutations {
                let change = DocumentChange {
                    collection,
                    id: mutation.id.clone(),
                    user_id,
                    expected_version: mutation.version,
                    data: mutation.data.clone(),
                };
                match self.documents.apply(&change, now).await? {
                    ApplyOutcome::Applied(doc) => applied.push(AppliedMutation {
                        collection,
                        record_id: doc.id,
                        new_version: doc.version,
                    }),
                    ApplyOutcome::Conflict { server } => {
                        let item = self
                            .enqueue_conflict(user_id, collection, &mutation, server)
                            .await?;
                        conflicts.push(ConflictReport {
                            collection,
                            record_id: mutation.id,
                            item_id: item.id,
                        });
                    }
                }
            }
        }

        self.users.set_sync_state(user_id, now, false).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::SyncPush, AuditResource::SyncQueueItem)
                    .actor(AuditActor {
                        user_id: Some(user_id),
                        email: None,
                        role: None,
                    })
                    .detail("applied", applied.len() as u64)
                    .detail("conflicts", conflicts.len() as u64)
                    .build(),
            )
            .await;

        Ok(PushOutcome { applied, conflicts })
    }

    async fn enqueue_conflict(
        &self,
        user_id: UserId,
        collection: Collection,
        mutation: &RecordMutation,
        server: Option<Document>,
    ) -> Result<SyncQueueItem> {
        let (conflict_type, server_version, server_data) = match server {
            Some(doc) => (ConflictType::VersionMismatch, doc.version, doc.data),
            None => (ConflictType::MissingRecord, 0, Value::Null),
        };
        let requires_user_input = mutation.strategy == ResolutionStrategy::Manual;
        let descriptor = ConflictDescriptor {
            conflict_type,
            collection,
            record_id: mutation.id.clone(),
            client_version: mutation.version,
            server_version,
            client_data: mutation.data.clone(),
            server_data,
            strategy: mutation.strategy,
            resolved_data: None,
            requires_user_input,
            user_decision: None,
        };
        let now = Utc::now();
        let item = SyncQueueItem {
            id: SyncItemId::new(),
            user_id,
            item_type: SyncItemType::ConflictResolution,
            status: SyncQueueStatus::Pending,
            priority: 0,
            data: Value::Null,
            conflict: Some(descriptor),
            retry_count: 0,
            max_retries: self.config.retry.max_retries,
            next_retry_at: now,
            last_attempt_at: None,
            last_error: None,
            processing_node: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let item = self.queue.enqueue(&item).await?;
        tracing::info!(
            item_id = %item.id,
            collection = collection.as_str(),
            record_id = %mutation.id,
            "Push mutation conflicted; queued for resolution"
        );
        Ok(item)
    }

    // ═══════════════════════════════════════════════════════════
    // Status and queue surface
    // ═══════════════════════════════════════════════════════════

    /// Per-user sync status read model.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown users.
    pub async fn get_status(&self, user_id: UserId) -> Result<SyncStatus> {
        let user = self.users.get(user_id).await?;
        let counts = self.queue.counts_for_user(user_id).await?;
        let checkpoint = self.checkpoints.get_active(user_id).await?;
        Ok(SyncStatus {
            last_sync_at: user.last_sync_at,
            is_offline: user.is_offline,
            pending_items: counts.pending,
            failed_items: counts.failed,
            has_active_checkpoint: checkpoint.is_some(),
        })
    }

    /// Enqueue a background sync item.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn enqueue(
        &self,
        user_id: UserId,
        item_type: SyncItemType,
        priority: i32,
        data: Value,
    ) -> Result<SyncQueueItem> {
        let now = Utc::now();
        let item = SyncQueueItem {
            id: SyncItemId::new(),
            user_id,
            item_type,
            status: SyncQueueStatus::Pending,
            priority,
            data,
            conflict: None,
            retry_count: 0,
            max_retries: self.config.retry.max_retries,
            next_retry_at: now,
            last_attempt_at: None,
            last_error: None,
            processing_node: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        Ok(self.queue.enqueue(&item).await?)
    }

    /// Claim runnable queue items for a node (supervisor entry point).
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn claim(&self, node_id: &str, limit: usize) -> Result<Vec<SyncQueueItem>> {
        Ok(self.queue.claim_pending(node_id, limit, Utc::now()).await?)
    }

    /// Resolve a conflict item with an explicit strategy, applying the
    /// settled payload and completing the item.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown items, `InvalidInput` for items without a
    /// conflict, `RequiresUserInput` when `Manual` is chosen without a
    /// payload.
    pub async fn resolve_conflict(
        &self,
        item_id: SyncItemId,
        strategy: ResolutionStrategy,
        resolved_data: Option<Value>,
    ) -> Result<SyncQueueItem> {
        let mut item = self.queue.get(item_id).await?;
        let Some(mut descriptor) = item.conflict.clone() else {
            return Err(SyncError::InvalidInput(
                "item carries no conflict descriptor".into(),
            ));
        };

        let resolved = match strategy {
            ResolutionStrategy::ClientWins => descriptor.client_data.clone(),
            ResolutionStrategy::ServerWins => descriptor.server_data.clone(),
            ResolutionStrategy::Merge => {
                merge_payloads(&descriptor.server_data, &descriptor.client_data)
            }
            ResolutionStrategy::Manual => resolved_data.ok_or(SyncError::RequiresUserInput)?,
        };

        // Server-wins needs no write; anything else lands on the current
        // server version.
        if strategy != ResolutionStrategy::ServerWins {
            let current = self
                .documents
                .get(descriptor.collection, &descriptor.record_id)
                .await?;
            let expected_version = current.as_ref().map_or(0, |d| d.version);
            let change = DocumentChange {
                collection: descriptor.collection,
                id: descriptor.record_id.clone(),
                user_id: item.user_id,
                expected_version,
                data: resolved.clone(),
            };
            match self.documents.apply(&change, Utc::now()).await? {
                ApplyOutcome::Applied(_) => {}
                ApplyOutcome::Conflict { .. } => return Err(SyncError::VersionConflict),
            }
        }

        descriptor.strategy = strategy;
        descriptor.resolved_data = Some(resolved);
        descriptor.requires_user_input = false;
        if descriptor.user_decision.is_none() && strategy == ResolutionStrategy::Manual {
            descriptor.user_decision = Some("manual".to_string());
        }
        item.conflict = Some(descriptor);
        self.queue.update(&item).await?;
        let item = self.queue.complete(item.id, Utc::now()).await?;

        self.audit
            .record(
                AuditEntry::builder(AuditAction::ConflictResolved, AuditResource::SyncQueueItem)
                    .actor(AuditActor {
                        user_id: Some(item.user_id),
                        email: None,
                        role: None,
                    })
                    .resource_id(item.id.to_string())
                    .build(),
            )
            .await;

        Ok(item)
    }

    // ═══════════════════════════════════════════════════════════
    // Worker dispatch
    // ═══════════════════════════════════════════════════════════

    /// Process one claimed queue item. Called by the supervisor's workers;
    /// the caller settles the item per the returned outcome.
    ///
    /// # Errors
    ///
    /// Any processing failure; the worker maps retryable ones to
    /// `mark_for_retry`.
    pub async fn process_item(&self, item: &SyncQueueItem) -> Result<ItemOutcome> {
        match item.item_type {
            SyncItemType::Upload => {
                let changes: ChangeSet = serde_json::from_value(item.data.clone())
                    .map_err(|e| SyncError::InvalidInput(format!("upload payload: {e}")))?;
                self.push(item.user_id, changes).await?;
                Ok(ItemOutcome::Completed)
            }
            SyncItemType::Download => {
                // Stage a fresh delta server-side; the client collects it
                // on its next foreground pull.
                self.pull(PullRequest::new(item.user_id)).await?;
                Ok(ItemOutcome::Completed)
            }
            SyncItemType::ConflictResolution => {
                let Some(descriptor) = &item.conflict else {
                    return Err(SyncError::InvalidInput(
                        "conflict item without descriptor".into(),
                    ));
                };
                if descriptor.requires_user_input && descriptor.user_decision.is_none() {
                    self.defer_manual_conflict(item).await?;
                    return Ok(ItemOutcome::Deferred);
                }
                self.resolve_conflict(
                    item.id,
                    descriptor.strategy,
                    descriptor.resolved_data.clone(),
                )
                .await?;
                Ok(ItemOutcome::Finalized)
            }
        }
    }

    /// Push a manual conflict back to the queue at low priority until the
    /// user decides.
    async fn defer_manual_conflict(&self, item: &SyncQueueItem) -> Result<()> {
        let mut deferred = item.clone();
        deferred.status = SyncQueueStatus::Pending;
        deferred.priority = deferred.priority.min(-1);
        deferred.processing_node = None;
        deferred.next_retry_at = Utc::now() + self.config.claim_interval;
        self.queue.update(&deferred).await?;
        Ok(())
    }

    /// Sweep completed items and stale metrics per the retention config.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn cleanup(&self) -> Result<(u64, u64)> {
        let now = Utc::now();
        let items = self
            .queue
            .sweep_completed(now - self.config.completed_retention)
            .await?;
        let metrics = self
            .metrics
            .sweep(now - self.config.metrics_retention)
            .await?;
        if items > 0 || metrics > 0 {
            tracing::info!(items, metrics, "Sync cleanup swept");
        }
        Ok((items, metrics))
    }

    /// Settle a processed item: complete, retry with backoff, or fail.
    pub(crate) async fn settle(
        &self,
        item: &SyncQueueItem,
        outcome: std::result::Result<ItemOutcome, SyncError>,
    ) {
        let now = Utc::now();
        let result: std::result::Result<(), RepoError> = match outcome {
            Ok(ItemOutcome::Completed) => self.queue.complete(item.id, now).await.map(|_| ()),
            Ok(ItemOutcome::Finalized | ItemOutcome::Deferred) => Ok(()),
            Err(e) if e.is_retryable() && self.config.retry.can_retry(item.retry_count) => {
                let delay = self.config.retry.delay(item.retry_count);
                self.queue
                    .mark_for_retry(item.id, &e.to_string(), now + delay, now)
                    .await
                    .map(|_| ())
            }
            Err(e) => self.queue.fail(item.id, &e.to_string(), now).await.map(|_| ()),
        };
        if let Err(e) = result {
            tracing::error!(item_id = %item.id, error = %e, "Failed to settle queue item");
        }
    }
}

/// Shallow merge: client fields override server fields; non-object pairs
/// resolve to the client payload.
fn merge_payloads(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Object(s), Value::Object(c)) => {
            let mut merged = s.clone();
            for (k, v) in c {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => client.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_prefers_client_fields() {
        let server = json!({"a": 1, "b": 2});
        let client = json!({"b": 9, "c": 3});
        assert_eq!(merge_payloads(&server, &client), json!({"a": 1, "b": 9, "c": 3}));
    }

    #[test]
    fn test_merge_non_objects_takes_client() {
        assert_eq!(merge_payloads(&json!([1, 2]), &json!("x")), json!("x"));
    }
}
