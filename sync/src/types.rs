//! Request and response types of the sync surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokoni_core::ids::{SyncItemId, UserId};
use sokoni_core::model::{Collection, ResolutionStrategy};
use sokoni_core::repository::Document;
use std::collections::BTreeMap;

/// Rows grouped by collection tag, as delivered to clients.
pub type CollectionData = BTreeMap<String, Vec<Document>>;

/// Mutations grouped by collection, as received from clients.
pub type ChangeSet = BTreeMap<Collection, Vec<RecordMutation>>;

/// Checkpointed delta pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// User whose data is pulled.
    pub user_id: UserId,

    /// Opaque checkpoint from the previous pull. Authoritative over
    /// `last_sync_at` when both are present.
    pub checkpoint: Option<String>,

    /// Fallback watermark when no checkpoint is supplied.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Per-collection row cap; clamped server-side.
    pub limit: Option<usize>,

    /// Gzip the body.
    pub compression: bool,

    /// Client-reported network type, recorded in metrics.
    pub network_type: Option<String>,

    /// Client-reported connection quality, recorded in metrics.
    pub connection_quality: Option<String>,
}

impl PullRequest {
    /// Minimal pull for a user: no checkpoint, defaults everywhere.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            checkpoint: None,
            last_sync_at: None,
            limit: None,
            compression: false,
            network_type: None,
            connection_quality: None,
        }
    }
}

/// Checkpointed delta pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Rows by collection; `None` when the body is compressed.
    pub data: Option<CollectionData>,

    /// Gzip + base64 of the JSON body; `None` when uncompressed.
    pub compressed_blob: Option<String>,

    /// Checkpoint to present on the next pull.
    pub checkpoint: String,

    /// Server time of this sync.
    pub last_sync_at: DateTime<Utc>,

    /// `true` when some collection hit the row cap; pull again.
    pub has_more: bool,

    /// Whether the body is compressed.
    pub compressed: bool,

    /// Raw JSON body size in bytes.
    pub data_size: usize,

    /// Gzip byte length; equals `data_size` when uncompressed.
    pub compressed_size: usize,

    /// Total rows delivered.
    pub records_count: usize,

    /// Server-side duration of the pull.
    pub sync_duration_ms: u64,
}

/// Chunked pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedPullRequest {
    /// User whose data is pulled.
    pub user_id: UserId,

    /// Checkpoint from the previous completed pull; only read on chunk 0.
    pub checkpoint: Option<String>,

    /// Zero-based chunk index.
    pub chunk_index: u32,

    /// Records per chunk; clamped server-side.
    pub chunk_size: usize,

    /// Cursor from the previous chunk; required after chunk 0.
    pub resume_token: Option<String>,
}

/// Chunked pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedPullResponse {
    /// Rows of this chunk, by collection tag.
    pub data: CollectionData,

    /// `true` while more chunks remain in the window.
    pub has_more: bool,

    /// Index to request next.
    pub next_chunk: u32,

    /// Cursor binding subsequent chunks to this snapshot window.
    pub resume_token: String,

    /// Chunk count for the window.
    pub total_chunks: u32,

    /// New checkpoint; present only on the final chunk.
    pub checkpoint: Option<String>,
}

/// One client mutation inside a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMutation {
    /// Record id within its collection.
    pub id: String,

    /// Version the client based the mutation on; `0` creates.
    pub version: u64,

    /// New payload.
    pub data: serde_json::Value,

    /// Strategy to apply if the server version has moved on.
    #[serde(default = "default_strategy")]
    pub strategy: ResolutionStrategy,
}

const fn default_strategy() -> ResolutionStrategy {
    ResolutionStrategy::ServerWins
}

/// A mutation the push applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMutation {
    /// Collection of the record.
    pub collection: Collection,

    /// Record id.
    pub record_id: String,

    /// Version after the write.
    pub new_version: u64,
}

/// A mutation the push rejected into the conflict queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Collection of the record.
    pub collection: Collection,

    /// Record id.
    pub record_id: String,

    /// Queue item holding both payloads.
    pub item_id: SyncItemId,
}

/// Outcome of a push: what applied, what conflicted. Mutations are
/// independent — one conflict never blocks the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    /// Applied mutations.
    pub applied: Vec<AppliedMutation>,

    /// Conflicted mutations, now queued for resolution.
    pub conflicts: Vec<ConflictReport>,
}
