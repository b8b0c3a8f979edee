//! In-process pipeline wiring and fake collaborators for capture tests

#![allow(dead_code)]

use archive_hub::models::job::CaptureJob;
use archive_hub::models::snapshot::NewSnapshot;
use archive_hub::services::capture::{CaptureWorker, WorkerSettings};
use archive_hub::services::dispatcher::Dispatcher;
use archive_hub::services::export::ExportEngine;
use archive_hub::services::queue::{CaptureQueue, MemoryQueue};
use archive_hub::services::render::{RenderClient, RenderError, RenderedPage};
use archive_hub::services::retention::RetentionSweeper;
use archive_hub::services::storage::{ArtifactStore, LocalArtifactStore, StorageError};
use archive_hub::services::store::{MemorySnapshotStore, SnapshotStore};
use archive_hub::services::archive::ArchiveService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// PNG signature followed by the start of an IHDR chunk.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub fn page(title: &str, html: &str, text: &str, screenshot: Option<&[u8]>) -> RenderedPage {
    RenderedPage {
        title: title.to_string(),
        html: html.to_string(),
        text: text.to_string(),
        screenshot: screenshot.map(<[u8]>::to_vec),
    }
}

/// Returns the same page for every URL.
pub struct StaticRenderer {
    page: RenderedPage,
    calls: AtomicUsize,
}

impl StaticRenderer {
    pub fn new(page: RenderedPage) -> Self {
        Self {
            page,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderClient for StaticRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<RenderedPage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.page.clone())
    }
}

/// Plays back a fixed sequence of results, one per render call.
pub struct ScriptedRenderer {
    results: Mutex<VecDeque<Result<RenderedPage, RenderError>>>,
}

impl ScriptedRenderer {
    pub fn new(results: Vec<Result<RenderedPage, RenderError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl RenderClient for ScriptedRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<RenderedPage, RenderError> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RenderError::crash("no scripted result left")))
    }
}

/// Never finishes and ignores its timeout. Records when its render future is dropped.
#[derive(Default)]
pub struct HangingRenderer {
    pub dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderClient for HangingRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> Result<RenderedPage, RenderError> {
        let _flag = DropFlag(self.dropped.clone());
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Local artifact store with switchable write and delete failures.
pub struct FlakyArtifactStore {
    inner: LocalArtifactStore,
    fail_writes_ending_with: Mutex<Option<String>>,
    fail_removes_containing: Mutex<Option<String>>,
}

impl FlakyArtifactStore {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalArtifactStore::new(root),
            fail_writes_ending_with: Mutex::new(None),
            fail_removes_containing: Mutex::new(None),
        }
    }

    pub fn fail_writes_ending_with(&self, suffix: Option<&str>) {
        *self.fail_writes_ending_with.lock().unwrap() = suffix.map(str::to_string);
    }

    pub fn fail_removes_containing(&self, needle: Option<&str>) {
        *self.fail_removes_containing.lock().unwrap() = needle.map(str::to_string);
    }

    fn injected(key: &str) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected failure"),
        }
    }
}

#[async_trait]
impl ArtifactStore for FlakyArtifactStore {
    async fn write(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let fail = self
            .fail_writes_ending_with
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix));
        if fail {
            return Err(Self::injected(key));
        }
        self.inner.write(key, data, content_type).await
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.read(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let fail = self
            .fail_removes_containing
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| prefix.contains(needle));
        if fail {
            return Err(Self::injected(prefix));
        }
        self.inner.remove_prefix(prefix).await
    }

    fn location(&self, key: &str) -> String {
        self.inner.location(key)
    }
}

pub fn test_settings() -> WorkerSettings {
    WorkerSettings {
        render_timeout: Duration::from_secs(5),
        render_grace: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
    }
}

/// Store, queue and artifact directory wired the way the binaries wire them.
pub struct Pipeline {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemorySnapshotStore>,
    pub queue: Arc<MemoryQueue>,
    pub artifacts: Arc<FlakyArtifactStore>,
}

impl Pipeline {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(FlakyArtifactStore::new(dir.path()));
        Self {
            dir,
            store: Arc::new(MemorySnapshotStore::new()),
            queue: Arc::new(MemoryQueue::new()),
            artifacts,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> Arc<dyn CaptureQueue> {
        self.queue.clone()
    }

    pub fn artifacts(&self) -> Arc<dyn ArtifactStore> {
        self.artifacts.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store(), self.queue())
    }

    pub fn worker(&self, renderer: Arc<dyn RenderClient>) -> CaptureWorker {
        self.worker_with(renderer, test_settings())
    }

    pub fn worker_with(
        &self,
        renderer: Arc<dyn RenderClient>,
        settings: WorkerSettings,
    ) -> CaptureWorker {
        CaptureWorker::new(
            self.store(),
            self.queue(),
            self.artifacts(),
            renderer,
            settings,
        )
    }

    pub fn exporter(&self) -> ExportEngine {
        ExportEngine::new(self.store(), self.artifacts())
    }

    pub fn archive(&self) -> ArchiveService {
        ArchiveService::new(self.store(), self.artifacts())
    }

    pub fn sweeper(&self, days: i64) -> RetentionSweeper {
        RetentionSweeper::new(self.store(), self.artifacts(), chrono::Duration::days(days))
    }

    /// Insert a processing row created at `at` and return its capture job
    /// without queueing it.
    pub async fn seed(&self, url: &str, domain: &str, at: DateTime<Utc>) -> CaptureJob {
        let row = self
            .store
            .insert(&NewSnapshot::at(url, domain, at))
            .await
            .unwrap();
        CaptureJob {
            job_id: Uuid::new_v4(),
            snapshot_id: row.id,
            url: row.url,
            domain: row.domain,
            timestamp: row.timestamp,
        }
    }

    /// Every file under the artifact root, as `/`-joined relative paths.
    pub fn files(&self) -> Vec<String> {
        let mut found = Vec::new();
        collect_files(self.root(), self.root(), &mut found);
        found.sort();
        found
    }
}

fn collect_files(root: &Path, dir: &Path, found: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, found);
        } else if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            found.push(parts.join("/"));
        }
    }
}
