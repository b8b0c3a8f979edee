use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::snapshot::{
    CompletedCapture, NewSnapshot, Snapshot, SnapshotFilter, SnapshotStatus,
};

/// Durable keyed record of snapshot metadata and lifecycle status.
///
/// Implementations guarantee single-row atomicity only. The status guards on
/// `mark_completed` and `mark_failed` are what keep terminal rows terminal.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert a new row in `processing` state.
    async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Snapshot>, StoreError>;

    /// Rows matching `filter`, newest first.
    async fn find(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError>;

    /// Record a finished capture. Applies to `processing` rows and, for
    /// redelivered jobs, to already `completed` rows. Returns false when the
    /// row is missing or failed.
    async fn mark_completed(
        &self,
        id: i64,
        capture: &CompletedCapture,
    ) -> Result<bool, StoreError>;

    /// Move a `processing` row to `failed`. Returns false for any other row.
    async fn mark_failed(&self, id: i64) -> Result<bool, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Connectivity check for health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt snapshot row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// In-process store backed by a vector.
///
/// Used by tests and by pipelines that do not need durability.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<MemoryRows>,
}

#[derive(Debug, Default)]
struct MemoryRows {
    next_id: i64,
    rows: Vec<Snapshot>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, MemoryRows> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.rows().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, StoreError> {
        let mut guard = self.rows();
        guard.next_id += 1;
        let row = Snapshot {
            id: guard.next_id,
            url: snapshot.url.clone(),
            domain: snapshot.domain.clone(),
            timestamp: snapshot.timestamp.clone(),
            title: None,
            status: SnapshotStatus::Processing,
            size: None,
            content_preview: None,
            snapshot_path: None,
            screenshot_path: None,
            created_at: snapshot.created_at,
            updated_at: snapshot.created_at,
        };
        guard.rows.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: i64) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.rows().rows.iter().find(|s| s.id == id).cloned())
    }

    async fn find(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError> {
        let mut found: Vec<Snapshot> = self
            .rows()
            .rows
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn mark_completed(
        &self,
        id: i64,
        capture: &CompletedCapture,
    ) -> Result<bool, StoreError> {
        let mut guard = self.rows();
        let Some(row) = guard.rows.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if row.status == SnapshotStatus::Failed {
            return Ok(false);
        }
        row.status = SnapshotStatus::Completed;
        row.title = Some(capture.title.clone());
        row.size = Some(capture.size);
        row.content_preview = Some(capture.content_preview.clone());
        row.snapshot_path = Some(capture.snapshot_path.clone());
        row.screenshot_path = capture.screenshot_path.clone();
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(&self, id: i64) -> Result<bool, StoreError> {
        let mut guard = self.rows();
        let Some(row) = guard.rows.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if row.status != SnapshotStatus::Processing {
            return Ok(false);
        }
        row.status = SnapshotStatus::Failed;
        row.size = None;
        row.content_preview = None;
        row.snapshot_path = None;
        row.screenshot_path = None;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut guard = self.rows();
        let before = guard.rows.len();
        guard.rows.retain(|s| s.id != id);
        Ok(guard.rows.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
