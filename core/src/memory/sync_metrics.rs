//! In-memory sync metrics store.

use super::poisoned;
use crate::error::RepoResult;
use crate::ids::UserId;
use crate::model::SyncMetrics;
use crate::repository::SyncMetricsStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Mutex-protected metrics log.
#[derive(Debug, Clone, Default)]
pub struct MemorySyncMetricsStore {
    rows: Arc<Mutex<Vec<SyncMetrics>>>,
}

impl MemorySyncMetricsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncMetricsStore for MemorySyncMetricsStore {
    async fn record(&self, metrics: &SyncMetrics) -> RepoResult<()> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        rows.push(metrics.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> RepoResult<Vec<SyncMetrics>> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut mine: Vec<SyncMetrics> = rows
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit);
        Ok(mine)
    }

    async fn sweep(&self, older_than: DateTime<Utc>) -> RepoResult<u64> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let before = rows.len();
        rows.retain(|m| m.created_at >= older_than);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(user: UserId, age_days: i64) -> SyncMetrics {
        SyncMetrics {
            user_id: user,
            duration_ms: 120,
            bytes_raw: 1024,
            bytes_compressed: 300,
            records_moved: 12,
            success: true,
            error: None,
            network_type: "cellular".into(),
            connection_quality: "fair".into(),
            created_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_sweep_enforces_retention() {
        let store = MemorySyncMetricsStore::new();
        let user = UserId::new();
        store.record(&metrics(user, 45)).await.unwrap();
        store.record(&metrics(user, 1)).await.unwrap();

        let swept = store
            .sweep(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert_eq!(store.list_for_user(user, 10).await.unwrap().len(), 1);
    }
}
