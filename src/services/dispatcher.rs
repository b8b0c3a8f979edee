use chrono::Utc;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::models::job::{CaptureJob, Submission};
use crate::models::snapshot::NewSnapshot;
use crate::services::queue::{CaptureQueue, QueueError};
use crate::services::store::{SnapshotStore, StoreError};

/// Accepts capture requests and hands them to the capture queue.
pub struct Dispatcher {
    store: Arc<dyn SnapshotStore>,
    queue: Arc<dyn CaptureQueue>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Capture queue unavailable, snapshot {snapshot_id} marked failed: {source}")]
    QueueUnavailable {
        snapshot_id: i64,
        #[source]
        source: QueueError,
    },

    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),
}

/// Archive key for a URL: its host, plus the port when one is given explicitly.
pub fn domain_of(url: &str) -> Result<String, DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs can be archived"));
    }
    let host = parsed.host_str().ok_or_else(|| invalid("URL has no host"))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SnapshotStore>, queue: Arc<dyn CaptureQueue>) -> Self {
        Self { store, queue }
    }

    /// Record a processing snapshot for `url` and enqueue its capture job.
    ///
    /// The row exists before the job does. If the job cannot be enqueued the
    /// row is marked failed before the error is returned.
    pub async fn submit(&self, url: &str) -> Result<Submission, DispatchError> {
        let url = url.trim();
        let domain = domain_of(url)?;
        let snapshot = self
            .store
            .insert(&NewSnapshot::at(url, domain, Utc::now()))
            .await?;

        let job = CaptureJob {
            job_id: Uuid::new_v4(),
            snapshot_id: snapshot.id,
            url: snapshot.url.clone(),
            domain: snapshot.domain.clone(),
            timestamp: snapshot.timestamp.clone(),
        };

        if let Err(source) = self.queue.enqueue(&job).await {
            tracing::error!(
                snapshot_id = snapshot.id,
                domain = %snapshot.domain,
                error = %source,
                "Failed to enqueue capture job"
            );
            if let Err(e) = self.store.mark_failed(snapshot.id).await {
                tracing::error!(
                    snapshot_id = snapshot.id,
                    error = %e,
                    "Failed to mark undispatched snapshot as failed"
                );
            }
            metrics::counter!("snapshot_dispatch_failures_total").increment(1);
            return Err(DispatchError::QueueUnavailable {
                snapshot_id: snapshot.id,
                source,
            });
        }

        metrics::counter!("snapshot_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job.job_id,
            snapshot_id = job.snapshot_id,
            domain = %job.domain,
            timestamp = %job.timestamp,
            "Capture job queued"
        );

        Ok(Submission {
            job_id: job.job_id,
            snapshot_id: job.snapshot_id,
            domain: job.domain,
            timestamp: job.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_strips_scheme_and_path() {
        assert_eq!(domain_of("http://example.com").unwrap(), "example.com");
        assert_eq!(
            domain_of("https://Example.COM/some/path?q=1#frag").unwrap(),
            "example.com"
        );
        assert_eq!(
            domain_of("https://example.com:8443/docs").unwrap(),
            "example.com:8443"
        );
        assert_eq!(domain_of("https://example.com:443/").unwrap(), "example.com");
    }

    #[test]
    fn test_domain_rejects_unarchivable_urls() {
        assert!(matches!(
            domain_of("example.com"),
            Err(DispatchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            domain_of("ftp://example.com/file"),
            Err(DispatchError::InvalidUrl { .. })
        ));
        assert!(domain_of("file:///etc/passwd").is_err());
    }
}
