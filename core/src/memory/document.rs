//! In-memory syncable-document store.

use super::poisoned;
use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::{Collection, Watermark};
use crate::repository::{ApplyOutcome, Document, DocumentChange, DocumentStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mutex-protected document map keyed by (collection, id). Version checks
/// run under the lock, matching the conditional-update contract of the
/// durable store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<Mutex<HashMap<(Collection, String), Document>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing version checks. Test and
    /// fixture helper.
    ///
    /// # Errors
    ///
    /// Fails only on a poisoned lock.
    pub fn seed(&self, doc: Document) -> RepoResult<()> {
        let mut docs = self.docs.lock().map_err(|_| poisoned())?;
        docs.insert((doc.collection, doc.id.clone()), doc);
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn changes_since(
        &self,
        user_id: UserId,
        collection: Collection,
        watermark: &Watermark,
        limit: usize,
    ) -> RepoResult<Vec<Document>> {
        let docs = self.docs.lock().map_err(|_| poisoned())?;
        let mut rows: Vec<Document> = docs
            .values()
            .filter(|d| d.collection == collection && d.user_id == user_id)
            .filter(|d| {
                let mark = Watermark {
                    updated_at_micros: d.updated_at.timestamp_micros(),
                    last_id: d.id.clone(),
                };
                mark > *watermark
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get(&self, collection: Collection, id: &str) -> RepoResult<Option<Document>> {
        let docs = self.docs.lock().map_err(|_| poisoned())?;
        Ok(docs.get(&(collection, id.to_string())).cloned())
    }

    async fn apply(&self, change: &DocumentChange, now: DateTime<Utc>) -> RepoResult<ApplyOutcome> {
        let mut docs = self.docs.lock().map_err(|_| poisoned())?;
        let key = (change.collection, change.id.clone());
        match docs.get_mut(&key) {
            Some(existing) => {
                if existing.version != change.expected_version {
                    return Ok(ApplyOutcome::Conflict {
                        server: Some(existing.clone()),
                    });
                }
                existing.version += 1;
                existing.updated_at = now;
                existing.data = change.data.clone();
                Ok(ApplyOutcome::Applied(existing.clone()))
            }
            None => {
                if change.expected_version != 0 {
                    // Client updated a row the server no longer has.
                    return Ok(ApplyOutcome::Conflict { server: None });
                }
                let doc = Document {
                    collection: change.collection,
                    id: change.id.clone(),
                    user_id: change.user_id,
                    version: 1,
                    updated_at: now,
                    data: change.data.clone(),
                };
                docs.insert(key, doc.clone());
                Ok(ApplyOutcome::Applied(doc))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(user: UserId, id: &str, version: u64) -> DocumentChange {
        DocumentChange {
            collection: Collection::Bookings,
            id: id.into(),
            user_id: user,
            expected_version: version,
            data: json!({"state": "confirmed"}),
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict_on_stale_version() {
        let store = MemoryDocumentStore::new();
        let user = UserId::new();
        let now = Utc::now();

        let created = store.apply(&change(user, "b-1", 0), now).await.unwrap();
        let ApplyOutcome::Applied(doc) = created else {
            panic!("create should apply");
        };
        assert_eq!(doc.version, 1);

        // Stale write: client still believes version 0.
        let outcome = store.apply(&change(user, "b-1", 0), now).await.unwrap();
        match outcome {
            ApplyOutcome::Conflict { server: Some(s) } => assert_eq!(s.version, 1),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_changes_since_respects_watermark_and_order() {
        let store = MemoryDocumentStore::new();
        let user = UserId::new();
        let base = Utc::now();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store
                .seed(Document {
                    collection: Collection::Bookings,
                    id: (*id).into(),
                    user_id: user,
                    version: 1,
                    updated_at: base + chrono::Duration::seconds(i as i64),
                    data: json!({}),
                })
                .unwrap();
        }

        let after_a = Watermark {
            updated_at_micros: base.timestamp_micros(),
            last_id: "a".into(),
        };
        let rows = store
            .changes_since(user, Collection::Bookings, &after_a, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_conflicts() {
        let store = MemoryDocumentStore::new();
        let outcome = store
            .apply(&change(UserId::new(), "ghost", 4), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Conflict { server: None });
    }
}
