use std::sync::Arc;

use crate::services::{
    archive::ArchiveService, dispatcher::Dispatcher, export::ExportEngine, queue::CaptureQueue,
    storage::ArtifactStore, store::SnapshotStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SnapshotStore>,
    pub queue: Arc<dyn CaptureQueue>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub archive: Arc<ArchiveService>,
    pub exporter: Arc<ExportEngine>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        queue: Arc<dyn CaptureQueue>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(store.clone(), queue.clone())),
            archive: Arc::new(ArchiveService::new(store.clone(), artifacts.clone())),
            exporter: Arc::new(ExportEngine::new(store.clone(), artifacts.clone())),
            store,
            queue,
            artifacts,
        }
    }
}
