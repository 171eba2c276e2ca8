//! Sync checkpoints, queue items, conflicts, and per-attempt metrics.

use crate::ids::{SyncItemId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A syncable collection.
///
/// The sync core treats record payloads as opaque JSON; the collection tag
/// is the only part it interprets, so adding a collection is a matter of
/// extending this enum and the document store behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// User profile rows.
    Users,

    /// Bookings owned by the user.
    Bookings,

    /// Services offered by the user (providers only).
    Services,

    /// Wallet ledger entries.
    Ledger,
}

impl Collection {
    /// All collections in sync scope, in watermark order.
    pub const ALL: [Self; 4] = [Self::Users, Self::Bookings, Self::Services, Self::Ledger];

    /// Stable snake_case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Bookings => "bookings",
            Self::Services => "services",
            Self::Ledger => "ledger",
        }
    }

    /// Parse a snake_case collection tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "users" => Some(Self::Users),
            "bookings" => Some(Self::Bookings),
            "services" => Some(Self::Services),
            "ledger" => Some(Self::Ledger),
            _ => None,
        }
    }
}

/// Highest `(updated_at, id)` pair already delivered for one collection.
///
/// Ordering is lexicographic on the pair, matching the
/// `(updated_at asc, id asc)` delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// Microseconds since the Unix epoch of the newest delivered row.
    pub updated_at_micros: i64,

    /// Tiebreaker: the id of the newest delivered row.
    pub last_id: String,
}

impl Watermark {
    /// Watermark admitting every row.
    #[must_use]
    pub fn origin() -> Self {
        Self::default()
    }

    /// Watermark from a timestamp with an empty tiebreaker.
    #[must_use]
    pub fn from_time(at: DateTime<Utc>) -> Self {
        Self {
            updated_at_micros: at.timestamp_micros(),
            last_id: String::new(),
        }
    }
}

/// Per-user resumption token row.
///
/// At most one active checkpoint per user; superseded rows may be retained
/// for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Owning user.
    pub user_id: UserId,

    /// Opaque encoded checkpoint handed to the client.
    pub checkpoint: String,

    /// When the sync that produced this checkpoint completed.
    pub last_sync_at: DateTime<Utc>,

    /// Optimistic concurrency version.
    pub version: u64,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Kind of background sync work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItemType {
    /// Apply client changes to the server.
    Upload,

    /// Pull server changes and stage them for the client.
    Download,

    /// Settle a version conflict.
    ConflictResolution,
}

/// Queue item state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncQueueStatus {
    /// Waiting to be claimed.
    Pending,

    /// Claimed by a worker.
    Processing,

    /// Finished successfully.
    Completed,

    /// Exhausted its retries.
    Failed,

    /// Awaiting its next retry slot.
    Retrying,

    /// Abandoned by request.
    Cancelled,
}

/// Conflict classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Client and server both mutated the same record.
    VersionMismatch,

    /// Client attempted to update a record the server no longer has.
    MissingRecord,
}

/// How a conflict should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The client payload wins.
    ClientWins,

    /// The server payload wins.
    ServerWins,

    /// Field-wise merge of both payloads.
    Merge,

    /// A human must decide.
    Manual,
}

impl ResolutionStrategy {
    /// Parse a snake_case strategy tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "client_wins" => Some(Self::ClientWins),
            "server_wins" => Some(Self::ServerWins),
            "merge" => Some(Self::Merge),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Both sides of a rejected mutation, embedded in conflict items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDescriptor {
    /// Conflict classification.
    pub conflict_type: ConflictType,

    /// Collection the record belongs to.
    pub collection: Collection,

    /// Record identifier within the collection.
    pub record_id: String,

    /// Version the client based its mutation on.
    pub client_version: u64,

    /// Version the server holds.
    pub server_version: u64,

    /// The client's payload.
    pub client_data: serde_json::Value,

    /// The server's payload.
    pub server_data: serde_json::Value,

    /// Declared resolution strategy.
    pub strategy: ResolutionStrategy,

    /// Settled payload, once resolved.
    pub resolved_data: Option<serde_json::Value>,

    /// `true` when the strategy is manual and no decision has been made.
    pub requires_user_input: bool,

    /// The user's decision for manual conflicts.
    pub user_decision: Option<String>,
}

/// One unit of background sync work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Item identifier.
    pub id: SyncItemId,

    /// User the work belongs to.
    pub user_id: UserId,

    /// Work kind.
    pub item_type: SyncItemType,

    /// State machine position.
    pub status: SyncQueueStatus,

    /// Higher runs first.
    pub priority: i32,

    /// Opaque work payload.
    pub data: serde_json::Value,

    /// Conflict details for `ConflictResolution` items.
    pub conflict: Option<ConflictDescriptor>,

    /// Attempts so far.
    pub retry_count: u32,

    /// Attempt ceiling.
    pub max_retries: u32,

    /// Earliest instant the item may run again.
    pub next_retry_at: DateTime<Utc>,

    /// Last attempt start, if any.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Last failure message, if any.
    pub last_error: Option<String>,

    /// Node that claimed the item, while processing.
    pub processing_node: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,

    /// Completion timestamp, when completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncQueueItem {
    /// `true` when the item is eligible for another attempt at `now`.
    #[must_use]
    pub fn should_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == SyncQueueStatus::Failed
            && self.retry_count < self.max_retries
            && now >= self.next_retry_at
    }
}

/// One record per sync attempt, success or not. TTL-retained 30 days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// User the attempt belonged to.
    pub user_id: UserId,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Raw payload size in bytes.
    pub bytes_raw: u64,

    /// Compressed payload size in bytes; equals `bytes_raw` when
    /// compression was off.
    pub bytes_compressed: u64,

    /// Records moved in either direction.
    pub records_moved: u64,

    /// Whether the attempt succeeded.
    pub success: bool,

    /// Failure message for unsuccessful attempts.
    pub error: Option<String>,

    /// Client-reported network type ("wifi", "cellular", …).
    pub network_type: String,

    /// Client-reported connection quality label.
    pub connection_quality: String,

    /// Attempt timestamp.
    pub created_at: DateTime<Utc>,
}

/// Per-user sync read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Timestamp of the last completed sync, if any.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Client-reported offline flag.
    pub is_offline: bool,

    /// Queue items waiting or retrying.
    pub pending_items: u64,

    /// Queue items that exhausted retries.
    pub failed_items: u64,

    /// Whether an active checkpoint exists.
    pub has_active_checkpoint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_ordering_matches_delivery_order() {
        let earlier = Watermark {
            updated_at_micros: 1_000,
            last_id: "zzz".into(),
        };
        let later = Watermark {
            updated_at_micros: 2_000,
            last_id: "aaa".into(),
        };
        assert!(earlier < later);

        let tie_a = Watermark {
            updated_at_micros: 2_000,
            last_id: "a".into(),
        };
        let tie_b = Watermark {
            updated_at_micros: 2_000,
            last_id: "b".into(),
        };
        assert!(tie_a < tie_b);
    }

    #[test]
    fn test_should_retry_requires_failed_and_budget_and_time() {
        let now = Utc::now();
        let item = SyncQueueItem {
            id: SyncItemId::new(),
            user_id: UserId::new(),
            item_type: SyncItemType::Upload,
            status: SyncQueueStatus::Failed,
            priority: 0,
            data: serde_json::Value::Null,
            conflict: None,
            retry_count: 1,
            max_retries: 3,
            next_retry_at: now - chrono::Duration::seconds(1),
            last_attempt_at: Some(now),
            last_error: Some("transient".into()),
            processing_node: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        assert!(item.should_retry(now));

        let exhausted = SyncQueueItem {
            retry_count: 3,
            ..item.clone()
        };
        assert!(!exhausted.should_retry(now));

        let too_early = SyncQueueItem {
            next_retry_at: now + chrono::Duration::seconds(60),
            ..item
        };
        assert!(!too_early.should_retry(now));
    }
}
