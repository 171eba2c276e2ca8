//! End-to-end sync flows against the in-memory stores.

use serde_json::json;
use sokoni_core::ids::UserId;
use sokoni_core::memory::{
    MemoryAuditStore, MemoryCheckpointStore, MemoryDocumentStore, MemorySyncMetricsStore,
    MemorySyncQueueStore, MemoryUserStore,
};
use sokoni_core::model::{
    Collection, ResolutionStrategy, SyncItemType, SyncQueueStatus, UserRole,
};
use sokoni_core::repository::{DocumentStore, SyncMetricsStore, SyncQueueStore, UserStore};
use sokoni_core::{AuditRecorder, Money};
use sokoni_sync::compress::gunzip_base64;
use sokoni_sync::config::SyncConfig;
use sokoni_sync::error::SyncError;
use sokoni_sync::queue::SyncQueueSupervisor;
use sokoni_sync::service::SyncCore;
use sokoni_sync::types::{ChangeSet, ChunkedPullRequest, PullRequest, RecordMutation};

type TestCore = SyncCore<
    MemoryDocumentStore,
    MemorySyncQueueStore,
    MemoryCheckpointStore,
    MemorySyncMetricsStore,
    MemoryUserStore,
    MemoryAuditStore,
>;

struct Harness {
    core: TestCore,
    docs: MemoryDocumentStore,
    queue: MemorySyncQueueStore,
    metrics: MemorySyncMetricsStore,
    user_id: UserId,
}

async fn harness() -> Harness {
    harness_with(SyncConfig::default()).await
}

async fn harness_with(config: SyncConfig) -> Harness {
    let docs = MemoryDocumentStore::new();
    let queue = MemorySyncQueueStore::new();
    let metrics = MemorySyncMetricsStore::new();
    let users = MemoryUserStore::new();

    let now = chrono::Utc::now();
    let user = sokoni_core::model::User {
        id: UserId::new(),
        email: "sync@example.com".into(),
        phone: "+231770000002".into(),
        first_name: "Sia".into(),
        last_name: "Tamba".into(),
        password_hash: "$2b$12$x".into(),
        role: UserRole::Customer,
        email_verified: true,
        profile_image: None,
        address: None,
        wallet_balance: Money::ZERO,
        wallet_currency: "LRD".into(),
        last_sync_at: None,
        is_offline: true,
        version: 1,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    let user = users.create(&user).await.unwrap();

    let core = SyncCore::new(
        config,
        docs.clone(),
        queue.clone(),
        MemoryCheckpointStore::new(),
        metrics.clone(),
        users,
        AuditRecorder::new(MemoryAuditStore::new()),
    );
    Harness {
        core,
        docs,
        queue,
        metrics,
        user_id: user.id,
    }
}

fn booking_mutations(ids: &[&str]) -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        ids.iter()
            .map(|id| RecordMutation {
                id: (*id).to_string(),
                version: 0,
                data: json!({"id": id, "state": "requested"}),
                strategy: ResolutionStrategy::ServerWins,
            })
            .collect(),
    );
    changes
}

#[tokio::test]
async fn checkpointed_pull_delivers_exactly_the_delta() {
    let h = harness().await;

    // First pull: nothing yet, but a checkpoint to resume from.
    let first = h
        .core
        .pull(PullRequest::new(h.user_id))
        .await
        .unwrap();
    assert_eq!(first.records_count, 0);
    assert!(!first.has_more);
    let cp1 = first.checkpoint.clone();

    // Three new bookings arrive.
    h.core
        .push(h.user_id, booking_mutations(&["b-1", "b-2", "b-3"]))
        .await
        .unwrap();

    // Pull from CP1: exactly those three.
    let second = h
        .core
        .pull(PullRequest {
            checkpoint: Some(cp1),
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert_eq!(second.records_count, 3);
    assert!(!second.has_more);
    let data = second.data.clone().unwrap();
    let ids: Vec<&str> = data["bookings"].iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["b-1", "b-2", "b-3"]);

    // Pull from CP2: quiet.
    let third = h
        .core
        .pull(PullRequest {
            checkpoint: Some(second.checkpoint.clone()),
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert_eq!(third.records_count, 0);

    // Every attempt left a metrics row.
    assert_eq!(h.metrics.list_for_user(h.user_id, 10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn has_more_set_when_limit_hit() {
    let h = harness().await;
    h.core
        .push(h.user_id, booking_mutations(&["b-1", "b-2", "b-3", "b-4"]))
        .await
        .unwrap();

    let resp = h
        .core
        .pull(PullRequest {
            limit: Some(2),
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert!(resp.has_more);
    assert_eq!(resp.records_count, 2);

    // Resuming from the returned checkpoint fetches the rest. The second
    // page also fills the limit, so the server still reports more.
    let rest = h
        .core
        .pull(PullRequest {
            checkpoint: Some(resp.checkpoint),
            limit: Some(2),
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert_eq!(rest.records_count, 2);
    assert!(rest.has_more);

    let empty = h
        .core
        .pull(PullRequest {
            checkpoint: Some(rest.checkpoint),
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert_eq!(empty.records_count, 0);
    assert!(!empty.has_more);
}

#[tokio::test]
async fn compressed_pull_carries_the_same_body() {
    let h = harness().await;
    h.core
        .push(h.user_id, booking_mutations(&["b-1", "b-2"]))
        .await
        .unwrap();

    let plain = h.core.pull(PullRequest::new(h.user_id)).await.unwrap();
    let compressed = h
        .core
        .pull(PullRequest {
            compression: true,
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();

    assert!(compressed.compressed);
    assert!(compressed.data.is_none());
    let blob = compressed.compressed_blob.clone().unwrap();
    let raw = gunzip_base64(&blob).unwrap();
    let expected = serde_json::to_vec(&plain.data.clone().unwrap()).unwrap();
    assert_eq!(raw, expected);
    assert_eq!(compressed.data_size, expected.len());
    assert!(compressed.compressed_size > 0);
}

#[tokio::test]
async fn push_conflict_is_captured_not_applied() {
    let h = harness().await;

    // Server is at version 1.
    h.core
        .push(h.user_id, booking_mutations(&["b-9"]))
        .await
        .unwrap();
    let server_doc = h.docs.get(Collection::Bookings, "b-9").await.unwrap().unwrap();
    assert_eq!(server_doc.version, 1);

    // Client pushes an update based on a version the server never had.
    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        vec![RecordMutation {
            id: "b-9".into(),
            version: 3,
            data: json!({"id": "b-9", "state": "cancelled"}),
            strategy: ResolutionStrategy::ServerWins,
        }],
    );
    let outcome = h.core.push(h.user_id, changes).await.unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.conflicts.len(), 1);

    // The booking is untouched.
    let after = h.docs.get(Collection::Bookings, "b-9").await.unwrap().unwrap();
    assert_eq!(after.data["state"], "requested");

    // The queue item carries both payloads.
    let item = h.queue.get(outcome.conflicts[0].item_id).await.unwrap();
    assert_eq!(item.item_type, SyncItemType::ConflictResolution);
    let conflict = item.conflict.clone().unwrap();
    assert_eq!(conflict.client_version, 3);
    assert_eq!(conflict.server_version, 1);
    assert_eq!(conflict.client_data["state"], "cancelled");
    assert_eq!(conflict.server_data["state"], "requested");

    // Server-wins resolution: state stays, item completes.
    let resolved = h
        .core
        .resolve_conflict(item.id, ResolutionStrategy::ServerWins, None)
        .await
        .unwrap();
    assert_eq!(resolved.status, SyncQueueStatus::Completed);
    let settled = h.docs.get(Collection::Bookings, "b-9").await.unwrap().unwrap();
    assert_eq!(settled.data["state"], "requested");
    assert_eq!(settled.version, 1);
}

#[tokio::test]
async fn conflict_in_batch_does_not_block_other_mutations() {
    let h = harness().await;
    h.core
        .push(h.user_id, booking_mutations(&["b-1"]))
        .await
        .unwrap();

    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        vec![
            RecordMutation {
                id: "b-1".into(),
                version: 99,
                data: json!({"id": "b-1", "state": "stale"}),
                strategy: ResolutionStrategy::ServerWins,
            },
            RecordMutation {
                id: "b-2".into(),
                version: 0,
                data: json!({"id": "b-2", "state": "requested"}),
                strategy: ResolutionStrategy::ServerWins,
            },
        ],
    );
    let outcome = h.core.push(h.user_id, changes).await.unwrap();
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.conflicts.len(), 1);
    assert!(h.docs.get(Collection::Bookings, "b-2").await.unwrap().is_some());
}

#[tokio::test]
async fn client_wins_resolution_applies_client_payload() {
    let h = harness().await;
    h.core
        .push(h.user_id, booking_mutations(&["b-5"]))
        .await
        .unwrap();

    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        vec![RecordMutation {
            id: "b-5".into(),
            version: 7,
            data: json!({"id": "b-5", "state": "rescheduled"}),
            strategy: ResolutionStrategy::ClientWins,
        }],
    );
    let outcome = h.core.push(h.user_id, changes).await.unwrap();
    let item_id = outcome.conflicts[0].item_id;

    h.core
        .resolve_conflict(item_id, ResolutionStrategy::ClientWins, None)
        .await
        .unwrap();
    let doc = h.docs.get(Collection::Bookings, "b-5").await.unwrap().unwrap();
    assert_eq!(doc.data["state"], "rescheduled");
    assert_eq!(doc.version, 2);
}

#[tokio::test]
async fn chunked_pull_concatenates_to_the_unbounded_pull() {
    let h = harness().await;
    let ids: Vec<String> = (0..10).map(|i| format!("b-{i:02}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    h.core.push(h.user_id, booking_mutations(&id_refs)).await.unwrap();

    // Unbounded single pull over the same data.
    let single = h.core.pull(PullRequest::new(h.user_id)).await.unwrap();
    let single_ids: Vec<String> = single.data.unwrap()["bookings"]
        .iter()
        .map(|d| d.id.clone())
        .collect();

    // Chunked: 3 records at a time.
    let mut collected: Vec<String> = Vec::new();
    let mut chunk_index = 0;
    let mut resume_token = None;
    let mut final_checkpoint = None;
    loop {
        let resp = h
            .core
            .pull_chunked(ChunkedPullRequest {
                user_id: h.user_id,
                checkpoint: None,
                chunk_index,
                chunk_size: 3,
                resume_token: resume_token.clone(),
            })
            .await
            .unwrap();
        assert_eq!(resp.total_chunks, 4);
        if let Some(rows) = resp.data.get("bookings") {
            collected.extend(rows.iter().map(|d| d.id.clone()));
        }
        resume_token = Some(resp.resume_token.clone());
        if !resp.has_more {
            final_checkpoint = resp.checkpoint.clone();
            break;
        }
        chunk_index = resp.next_chunk;
    }

    assert_eq!(collected, single_ids);

    // The final checkpoint covers the whole window.
    let after = h
        .core
        .pull(PullRequest {
            checkpoint: final_checkpoint,
            ..PullRequest::new(h.user_id)
        })
        .await
        .unwrap();
    assert_eq!(after.records_count, 0);
}

#[tokio::test]
async fn resume_token_rejects_other_users() {
    let h = harness().await;
    h.core.push(h.user_id, booking_mutations(&["b-1"])).await.unwrap();
    let first = h
        .core
        .pull_chunked(ChunkedPullRequest {
            user_id: h.user_id,
            checkpoint: None,
            chunk_index: 0,
            chunk_size: 1,
            resume_token: None,
        })
        .await
        .unwrap();

    let err = h
        .core
        .pull_chunked(ChunkedPullRequest {
            user_id: UserId::new(),
            checkpoint: None,
            chunk_index: 1,
            chunk_size: 1,
            resume_token: Some(first.resume_token),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));
}

#[tokio::test]
async fn status_reflects_queue_and_checkpoint() {
    let h = harness().await;

    let before = h.core.get_status(h.user_id).await.unwrap();
    assert!(!before.has_active_checkpoint);
    assert_eq!(before.pending_items, 0);
    assert!(before.is_offline);

    h.core
        .enqueue(h.user_id, SyncItemType::Download, 0, json!({}))
        .await
        .unwrap();
    h.core.pull(PullRequest::new(h.user_id)).await.unwrap();

    let after = h.core.get_status(h.user_id).await.unwrap();
    assert!(after.has_active_checkpoint);
    assert_eq!(after.pending_items, 1);
    assert!(!after.is_offline);
    assert!(after.last_sync_at.is_some());
}

#[tokio::test]
async fn supervisor_processes_uploads_in_background() {
    let config = SyncConfig::default()
        .with_workers(2)
        .with_claim_interval(chrono::Duration::milliseconds(40));
    let h = harness_with(config).await;

    let payload = serde_json::to_value(booking_mutations(&["bg-1", "bg-2"])).unwrap();
    let item = h
        .core
        .enqueue(h.user_id, SyncItemType::Upload, 5, payload)
        .await
        .unwrap();

    let handle = SyncQueueSupervisor::start(h.core.clone(), "node-test");
    // A few claim intervals are plenty.
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    handle.shutdown(std::time::Duration::from_secs(5)).await;

    assert_eq!(
        h.queue.get(item.id).await.unwrap().status,
        SyncQueueStatus::Completed
    );
    assert!(h.docs.get(Collection::Bookings, "bg-1").await.unwrap().is_some());
    assert!(h.docs.get(Collection::Bookings, "bg-2").await.unwrap().is_some());
}

#[tokio::test]
async fn supervisor_fails_malformed_uploads() {
    let config = SyncConfig::default().with_claim_interval(chrono::Duration::milliseconds(40));
    let h = harness_with(config).await;

    let item = h
        .core
        .enqueue(h.user_id, SyncItemType::Upload, 0, json!("not a changeset"))
        .await
        .unwrap();

    let handle = SyncQueueSupervisor::start(h.core.clone(), "node-test");
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    handle.shutdown(std::time::Duration::from_secs(5)).await;

    let failed = h.queue.get(item.id).await.unwrap();
    assert_eq!(failed.status, SyncQueueStatus::Failed);
    assert!(failed.last_error.is_some());
}

#[tokio::test]
async fn manual_conflict_waits_for_user_decision() {
    let config = SyncConfig::default().with_claim_interval(chrono::Duration::milliseconds(40));
    let h = harness_with(config).await;

    h.core.push(h.user_id, booking_mutations(&["m-1"])).await.unwrap();
    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        vec![RecordMutation {
            id: "m-1".into(),
            version: 42,
            data: json!({"id": "m-1", "state": "client-edit"}),
            strategy: ResolutionStrategy::Manual,
        }],
    );
    let outcome = h.core.push(h.user_id, changes).await.unwrap();
    let item_id = outcome.conflicts[0].item_id;
    assert!(h.queue.get(item_id).await.unwrap().conflict.clone().unwrap().requires_user_input);

    // A worker pass defers it rather than resolving.
    let handle = SyncQueueSupervisor::start(h.core.clone(), "node-test");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    handle.shutdown(std::time::Duration::from_secs(5)).await;

    let deferred = h.queue.get(item_id).await.unwrap();
    assert_eq!(deferred.status, SyncQueueStatus::Pending);
    assert!(deferred.priority < 0);

    // The user decides; the item completes and the payload lands.
    let resolved = h
        .core
        .resolve_conflict(
            item_id,
            ResolutionStrategy::Manual,
            Some(json!({"id": "m-1", "state": "user-decided"})),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, SyncQueueStatus::Completed);
    let doc = h.docs.get(Collection::Bookings, "m-1").await.unwrap().unwrap();
    assert_eq!(doc.data["state"], "user-decided");
}

#[tokio::test]
async fn manual_resolution_without_payload_is_rejected() {
    let h = harness().await;
    h.core.push(h.user_id, booking_mutations(&["x-1"])).await.unwrap();
    let mut changes = ChangeSet::new();
    changes.insert(
        Collection::Bookings,
        vec![RecordMutation {
            id: "x-1".into(),
            version: 9,
            data: json!({}),
            strategy: ResolutionStrategy::Manual,
        }],
    );
    let outcome = h.core.push(h.user_id, changes).await.unwrap();
    let err = h
        .core
        .resolve_conflict(outcome.conflicts[0].item_id, ResolutionStrategy::Manual, None)
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::RequiresUserInput);
}
