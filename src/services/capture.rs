//! Capture worker.
//!
//! Each job moves through `received -> rendering -> persisting` and ends
//! `completed` or `failed`. The job is acknowledged only once that terminal
//! outcome is recorded in the store; store or queue errors leave it in flight
//! so it is redelivered.

use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::Display;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::models::job::CaptureJob;
use crate::models::snapshot::{CompletedCapture, SnapshotStatus};
use crate::services::queue::{CaptureQueue, QueueError};
use crate::services::render::{RenderClient, RenderError, RenderedPage};
use crate::services::storage::{self, ArtifactStore};
use crate::services::store::{SnapshotStore, StoreError};

const PREVIEW_CHARS: usize = 1000;
const BYTES_PER_MB: f64 = 1_048_576.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CaptureStage {
    Received,
    Rendering,
    Persisting,
}

/// Terminal result of processing one job.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Completed { size: f64, screenshot: bool },
    /// `kind` is a [`crate::services::render::RenderErrorKind`] name or `ArtifactWrite`.
    Failed { kind: String, message: String },
    /// Row missing, already failed, or removed while the capture ran.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Deadline handed to the render client.
    pub render_timeout: Duration,
    /// Extra time before the worker abandons a render client that ignores its deadline.
    pub render_grace: Duration,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(60),
            render_grace: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            render_timeout: config.render_timeout(),
            poll_interval: config.poll_interval(),
            ..Self::default()
        }
    }
}

/// HTML size in MB, rounded to two decimals.
pub fn size_in_mb(bytes: usize) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// First 1000 characters of the extracted text.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[derive(Clone)]
pub struct CaptureWorker {
    store: Arc<dyn SnapshotStore>,
    queue: Arc<dyn CaptureQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn RenderClient>,
    settings: WorkerSettings,
}

impl CaptureWorker {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        queue: Arc<dyn CaptureQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        renderer: Arc<dyn RenderClient>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            queue,
            artifacts,
            renderer,
            settings,
        }
    }

    /// Poll the queue until `shutdown` flips to true. A job in progress is
    /// always finished before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Capture worker ready, starting job loop");

        while !*shutdown.borrow() {
            match self.process_next().await {
                Ok(true) => {
                    tracing::debug!("Job processed, checking for next job");
                    continue;
                }
                Ok(false) => {
                    tracing::trace!("No jobs available, sleeping");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error processing job, leaving it for redelivery");
                }
            }

            tokio::select! {
                _ = sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Capture worker stopped");
    }

    /// Process the next job from the queue.
    /// Returns Ok(true) if a job was processed, Ok(false) if none was available.
    pub async fn process_next(&self) -> Result<bool, CaptureError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        if let Ok(depth) = self.queue.depth().await {
            metrics::gauge!("snapshot_queue_depth").set(depth as f64);
        }

        self.process(&job).await?;
        self.queue.ack(&job).await?;
        Ok(true)
    }

    /// Run one job to its terminal outcome without touching the queue.
    pub async fn process(&self, job: &CaptureJob) -> Result<CaptureOutcome, CaptureError> {
        let stage = CaptureStage::Received;
        tracing::info!(
            job_id = %job.job_id,
            snapshot_id = job.snapshot_id,
            domain = %job.domain,
            stage = %stage,
            "Processing capture job"
        );

        let Some(row) = self.store.get(job.snapshot_id).await? else {
            tracing::info!(job_id = %job.job_id, snapshot_id = job.snapshot_id, "Snapshot no longer exists, skipping");
            return Ok(CaptureOutcome::Skipped);
        };
        if row.status == SnapshotStatus::Failed {
            tracing::info!(job_id = %job.job_id, snapshot_id = job.snapshot_id, "Snapshot already failed, skipping");
            return Ok(CaptureOutcome::Skipped);
        }
        if row.status == SnapshotStatus::Completed {
            tracing::info!(
                job_id = %job.job_id,
                snapshot_id = job.snapshot_id,
                "Redelivered job for completed snapshot, capturing again"
            );
        }

        let started = Instant::now();
        let page = match self.render(job).await {
            Ok(page) => page,
            Err(e) => {
                return self
                    .fail(job, e.kind.as_ref(), &e.message, started)
                    .await;
            }
        };

        let stage = CaptureStage::Persisting;
        tracing::debug!(job_id = %job.job_id, stage = %stage, "Writing artifacts");

        let html_key = storage::html_key(&job.domain, &job.timestamp);
        if let Err(e) = self
            .artifacts
            .write(&html_key, page.html.as_bytes(), "text/html; charset=utf-8")
            .await
        {
            return self
                .fail(job, "ArtifactWrite", &e.to_string(), started)
                .await;
        }

        let screenshot_path = match &page.screenshot {
            Some(bytes) => self.persist_screenshot(job, bytes).await,
            None => None,
        };

        let title = if page.title.trim().is_empty() {
            job.domain.clone()
        } else {
            page.title.clone()
        };
        let capture = CompletedCapture {
            title,
            size: size_in_mb(page.html.len()),
            content_preview: preview(&page.text),
            snapshot_path: self.artifacts.location(&html_key),
            screenshot_path,
        };

        if !self.store.mark_completed(job.snapshot_id, &capture).await? {
            tracing::warn!(
                job_id = %job.job_id,
                snapshot_id = job.snapshot_id,
                "Snapshot removed or failed during capture, result discarded"
            );
            return Ok(CaptureOutcome::Skipped);
        }

        let elapsed = started.elapsed();
        metrics::counter!("snapshot_captures_completed_total").increment(1);
        metrics::histogram!("snapshot_capture_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            job_id = %job.job_id,
            snapshot_id = job.snapshot_id,
            domain = %job.domain,
            size_mb = capture.size,
            screenshot = capture.screenshot_path.is_some(),
            duration_ms = elapsed.as_millis() as u64,
            "Capture completed"
        );

        Ok(CaptureOutcome::Completed {
            size: capture.size,
            screenshot: capture.screenshot_path.is_some(),
        })
    }

    /// Render with the client's own deadline, plus an outer one for clients
    /// that overrun it. Dropping the render future tears down its browser.
    async fn render(&self, job: &CaptureJob) -> Result<RenderedPage, RenderError> {
        let stage = CaptureStage::Rendering;
        tracing::debug!(job_id = %job.job_id, url = %job.url, stage = %stage, "Rendering page");

        let timeout = self.settings.render_timeout;
        let outer = timeout + self.settings.render_grace;
        match tokio::time::timeout(outer, self.renderer.render(&job.url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::timeout(timeout)),
        }
    }

    async fn persist_screenshot(&self, job: &CaptureJob, bytes: &[u8]) -> Option<String> {
        if !matches!(image::guess_format(bytes), Ok(image::ImageFormat::Png)) {
            tracing::warn!(job_id = %job.job_id, "Renderer returned a non-PNG screenshot, skipping it");
            return None;
        }

        let key = storage::screenshot_key(&job.domain, &job.timestamp);
        match self.artifacts.write(&key, bytes, "image/png").await {
            Ok(()) => Some(self.artifacts.location(&key)),
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Failed to store screenshot");
                None
            }
        }
    }

    async fn fail(
        &self,
        job: &CaptureJob,
        kind: &str,
        message: &str,
        started: Instant,
    ) -> Result<CaptureOutcome, CaptureError> {
        metrics::counter!("snapshot_captures_failed_total", "kind" => kind.to_string()).increment(1);

        if self.store.mark_failed(job.snapshot_id).await? {
            tracing::warn!(
                job_id = %job.job_id,
                snapshot_id = job.snapshot_id,
                domain = %job.domain,
                kind = %kind,
                error = %message,
                duration_ms = started.elapsed().as_millis() as u64,
                "Capture failed"
            );
        } else {
            tracing::warn!(
                job_id = %job.job_id,
                snapshot_id = job.snapshot_id,
                kind = %kind,
                error = %message,
                "Redelivered capture failed, keeping existing snapshot"
            );
        }

        Ok(CaptureOutcome::Failed {
            kind: kind.to_string(),
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_mb_rounds_to_two_decimals() {
        assert_eq!(size_in_mb(0), 0.0);
        assert_eq!(size_in_mb(1_048_576), 1.0);
        assert_eq!(size_in_mb(1_258_291), 1.2);
        assert_eq!(size_in_mb(5_000), 0.0);
        assert_eq!(size_in_mb(10_486), 0.01);
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let text = "é".repeat(1500);
        let p = preview(&text);
        assert_eq!(p.chars().count(), 1000);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(CaptureStage::Received.to_string(), "received");
        assert_eq!(CaptureStage::Persisting.to_string(), "persisting");
    }
}
