use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::archive::{DeleteReport, ListQuery};
use crate::models::snapshot::{Snapshot, SnapshotFilter, SnapshotStatus};
use crate::services::storage::{self, ArtifactStore, StorageError};
use crate::services::store::{SnapshotStore, StoreError};

/// Read and delete access to captured snapshots.
pub struct ArchiveService {
    store: Arc<dyn SnapshotStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Snapshot not found: {domain}/{timestamp}")]
    NotFound { domain: String, timestamp: String },

    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ListQuery> for SnapshotFilter {
    fn from(query: ListQuery) -> Self {
        SnapshotFilter {
            domain: None,
            status: query.status,
            timestamps: None,
            created_after: query.from,
            created_before: query.to,
            size: query.size,
            content_contains: query.q.filter(|q| !q.trim().is_empty()),
        }
    }
}

impl ArchiveService {
    pub fn new(store: Arc<dyn SnapshotStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    /// Snapshots of `domain` matching `query`, newest first.
    pub async fn list(&self, domain: &str, query: ListQuery) -> Result<Vec<Snapshot>, ArchiveError> {
        let filter = SnapshotFilter {
            domain: Some(domain.to_string()),
            ..SnapshotFilter::from(query)
        };
        Ok(self.store.find(&filter).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Snapshot>, ArchiveError> {
        Ok(self.store.get(id).await?)
    }

    /// Latest completed row for a `(domain, timestamp)` key.
    async fn completed(&self, domain: &str, timestamp: &str) -> Result<Snapshot, ArchiveError> {
        let filter = SnapshotFilter::for_domain(domain)
            .with_status(SnapshotStatus::Completed)
            .with_timestamps([timestamp]);
        self.store
            .find(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(domain, timestamp))
    }

    /// Stored HTML of a completed snapshot.
    pub async fn read_html(&self, domain: &str, timestamp: &str) -> Result<Vec<u8>, ArchiveError> {
        let snapshot = self.completed(domain, timestamp).await?;
        self.artifacts
            .read(&storage::html_key(&snapshot.domain, &snapshot.timestamp))
            .await?
            .ok_or_else(|| not_found(domain, timestamp))
    }

    /// Stored screenshot of a completed snapshot, if one was captured.
    pub async fn read_screenshot(
        &self,
        domain: &str,
        timestamp: &str,
    ) -> Result<Vec<u8>, ArchiveError> {
        let snapshot = self.completed(domain, timestamp).await?;
        if snapshot.screenshot_path.is_none() {
            return Err(not_found(domain, timestamp));
        }
        self.artifacts
            .read(&storage::screenshot_key(&snapshot.domain, &snapshot.timestamp))
            .await?
            .ok_or_else(|| not_found(domain, timestamp))
    }

    /// Delete the records and artifact directories of `timestamps` under `domain`.
    ///
    /// Rows still processing are left alone and counted in the report. A
    /// directory shared with a surviving row is kept.
    pub async fn delete(
        &self,
        domain: &str,
        timestamps: &BTreeSet<String>,
    ) -> Result<DeleteReport, ArchiveError> {
        let mut report = DeleteReport::default();
        if timestamps.is_empty() {
            return Ok(report);
        }

        let filter = SnapshotFilter::for_domain(domain).with_timestamps(timestamps.iter().cloned());
        let rows = self.store.find(&filter).await?;

        let mut busy: BTreeSet<&str> = BTreeSet::new();
        for row in rows.iter().filter(|r| r.status == SnapshotStatus::Processing) {
            busy.insert(row.timestamp.as_str());
            report.skipped_processing += 1;
        }

        for row in rows.iter().filter(|r| r.status != SnapshotStatus::Processing) {
            if !busy.contains(row.timestamp.as_str()) {
                self.artifacts
                    .remove_prefix(&storage::snapshot_prefix(&row.domain, &row.timestamp))
                    .await?;
            }
            if self.store.delete(row.id).await? {
                report.deleted += 1;
            }
        }

        tracing::info!(
            domain = %domain,
            deleted = report.deleted,
            skipped_processing = report.skipped_processing,
            "Snapshots deleted"
        );

        Ok(report)
    }
}

fn not_found(domain: &str, timestamp: &str) -> ArchiveError {
    ArchiveError::NotFound {
        domain: domain.to_string(),
        timestamp: timestamp.to_string(),
    }
}
