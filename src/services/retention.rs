use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::models::snapshot::SnapshotFilter;
use crate::services::storage::{self, ArtifactStore, StorageError};
use crate::services::store::{SnapshotStore, StoreError};

/// Deletes snapshots, records and artifact directories, older than a fixed window.
pub struct RetentionSweeper {
    store: Arc<dyn SnapshotStore>,
    artifacts: Arc<dyn ArtifactStore>,
    window: chrono::Duration,
}

/// A snapshot the sweep could not remove.
#[derive(Debug)]
pub struct SweepFailure {
    pub snapshot_id: i64,
    pub domain: String,
    pub timestamp: String,
    pub error: RetentionError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub cutoff: Option<DateTime<Utc>>,
    pub deleted: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err(RetentionError::Partial)` when any snapshot survived the sweep.
    pub fn into_result(self) -> Result<usize, RetentionError> {
        if self.failures.is_empty() {
            Ok(self.deleted)
        } else {
            Err(RetentionError::Partial {
                deleted: self.deleted,
                failed: self.failures.len(),
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Retention sweep incomplete: {deleted} deleted, {failed} failed")]
    Partial { deleted: usize, failed: usize },
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        artifacts: Arc<dyn ArtifactStore>,
        window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            artifacts,
            window,
        }
    }

    /// Delete every snapshot created before `now - window`, whatever its status.
    ///
    /// The artifact directory goes first. When that fails the record is kept
    /// so the next sweep retries it.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RetentionError> {
        let cutoff = now - self.window;
        let expired = self
            .store
            .find(&SnapshotFilter::default().created_before(cutoff))
            .await?;

        let mut report = SweepReport {
            cutoff: Some(cutoff),
            ..SweepReport::default()
        };

        for snapshot in expired {
            let prefix = storage::snapshot_prefix(&snapshot.domain, &snapshot.timestamp);
            let result = match self.artifacts.remove_prefix(&prefix).await {
                Ok(()) => self
                    .store
                    .delete(snapshot.id)
                    .await
                    .map_err(RetentionError::from),
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(_) => {
                    tracing::debug!(
                        snapshot_id = snapshot.id,
                        domain = %snapshot.domain,
                        timestamp = %snapshot.timestamp,
                        "Expired snapshot deleted"
                    );
                    report.deleted += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        snapshot_id = snapshot.id,
                        domain = %snapshot.domain,
                        timestamp = %snapshot.timestamp,
                        error = %error,
                        "Failed to delete expired snapshot"
                    );
                    report.failures.push(SweepFailure {
                        snapshot_id: snapshot.id,
                        domain: snapshot.domain,
                        timestamp: snapshot.timestamp,
                        error,
                    });
                }
            }
        }

        metrics::counter!("retention_snapshots_deleted_total").increment(report.deleted as u64);
        tracing::info!(
            cutoff = %cutoff,
            deleted = report.deleted,
            failed = report.failures.len(),
            "Retention sweep finished"
        );

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Retention sweeper stopped");
    }
}
