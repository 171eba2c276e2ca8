//! Syncable-document store trait.
//!
//! The sync core moves rows between client and server without knowing
//! their shape: every syncable collection is exposed as versioned JSON
//! documents behind this trait, and payloads are parsed only at the
//! collection boundary by whoever owns that collection.

use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::{Collection, Watermark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One versioned row of a syncable collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Collection the row belongs to.
    pub collection: Collection,

    /// Row identifier within the collection.
    pub id: String,

    /// Owning user.
    pub user_id: UserId,

    /// Optimistic concurrency version.
    pub version: u64,

    /// Last mutation timestamp; drives delta queries.
    pub updated_at: DateTime<Utc>,

    /// Opaque row payload.
    pub data: serde_json::Value,
}

/// A client mutation against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Collection the row belongs to.
    pub collection: Collection,

    /// Row identifier within the collection.
    pub id: String,

    /// Owning user.
    pub user_id: UserId,

    /// Version the client based the mutation on; `0` creates.
    pub expected_version: u64,

    /// New payload.
    pub data: serde_json::Value,
}

/// Outcome of applying a [`DocumentChange`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The change was applied; the stored document after the write.
    Applied(Document),

    /// The versions diverged; the server row (if it still exists) so the
    /// caller can build a conflict record.
    Conflict {
        /// Current server document; `None` when the row is gone.
        server: Option<Document>,
    },
}

/// Versioned access to syncable collections.
pub trait DocumentStore: Send + Sync {
    /// Rows of `collection` belonging to `user_id` strictly above
    /// `watermark` in `(updated_at, id)` order, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn changes_since(
        &self,
        user_id: UserId,
        collection: Collection,
        watermark: &Watermark,
        limit: usize,
    ) -> impl Future<Output = RepoResult<Vec<Document>>> + Send;

    /// Fetch one document, if present.
    ///
    /// # Errors
    ///
    /// Returns store I/O failures.
    fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> impl Future<Output = RepoResult<Option<Document>>> + Send;

    /// Apply a mutation if `expected_version` matches the stored version
    /// (or `0` and the row is absent). On match the version bumps and
    /// `updated_at` is stamped; on mismatch the current server row comes
    /// back for conflict recording. *Atomic per document.*
    ///
    /// # Errors
    ///
    /// Returns store I/O failures (version mismatch is an outcome, not an
    /// error).
    fn apply(
        &self,
        change: &DocumentChange,
        now: DateTime<Utc>,
    ) -> impl Future<Output = RepoResult<ApplyOutcome>> + Send;
}
