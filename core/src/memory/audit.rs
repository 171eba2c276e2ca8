//! In-memory audit store.

use super::poisoned;
use crate::audit::{AuditAction, AuditEntry, AuditResource};
use crate::error::RepoResult;
use crate::ids::UserId;
use crate::repository::AuditStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Mutex-protected append-only audit log.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStore {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, in append order. Test helper.
    ///
    /// # Errors
    ///
    /// Fails only on a poisoned lock.
    pub fn all(&self) -> RepoResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.clone())
    }
}

fn page(
    mut rows: Vec<AuditEntry>,
    limit: usize,
    before: Option<DateTime<Utc>>,
) -> Vec<AuditEntry> {
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.0.cmp(&a.id.0)));
    if let Some(cutoff) = before {
        rows.retain(|e| e.timestamp < cutoff);
    }
    rows.truncate(limit);
    rows
}

impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> RepoResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        let rows = entries
            .iter()
            .filter(|e| e.actor.user_id == Some(user_id))
            .cloned()
            .collect();
        Ok(page(rows, limit, before))
    }

    async fn list_by_action(
        &self,
        action: AuditAction,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        let rows = entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect();
        Ok(page(rows, limit, before))
    }

    async fn list_by_resource(
        &self,
        resource: AuditResource,
        resource_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        let rows = entries
            .iter()
            .filter(|e| e.resource == resource && e.resource_id.as_deref() == Some(resource_id))
            .cloned()
            .collect();
        Ok(page(rows, limit, before))
    }
}
