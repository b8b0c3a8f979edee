use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::{AppConfig, ArtifactBackend};

pub const HTML_FILE: &str = "index.html";
pub const SCREENSHOT_FILE: &str = "screenshot.png";

/// Directory key holding every artifact of one snapshot.
pub fn snapshot_prefix(domain: &str, timestamp: &str) -> String {
    format!("{}/{}", domain, timestamp)
}

pub fn html_key(domain: &str, timestamp: &str) -> String {
    format!("{}/{}", snapshot_prefix(domain, timestamp), HTML_FILE)
}

pub fn screenshot_key(domain: &str, timestamp: &str) -> String {
    format!("{}/{}", snapshot_prefix(domain, timestamp), SCREENSHOT_FILE)
}

/// Hierarchical, path-addressed byte storage for snapshot artifacts.
///
/// Keys are relative, `/`-separated paths such as `example.com/1760659200/index.html`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `data`, replacing any previous object at `key`.
    async fn write(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Read an object. `Ok(None)` when it does not exist.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Recursively delete everything under `prefix`. Missing prefixes are not an error.
    async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError>;

    /// Human-readable location recorded in the snapshot row.
    fn location(&self, key: &str) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 request for {key} returned status {status}")]
    Status { key: String, status: u16 },

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Reject keys that could escape the storage root.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Artifacts on the local filesystem under a root directory (`snapshots/` by default).
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn write(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_error(key, e))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(key, e))
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let path = self.path_for(prefix)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(prefix, e)),
        }
    }

    fn location(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}

/// Artifacts in Cloudflare R2 object storage (S3-compatible).
pub struct R2ArtifactStore {
    bucket: Box<Bucket>,
    prefix: String,
}

impl R2ArtifactStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        prefix: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    fn object_key(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!("{}/{}", self.prefix, key))
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn write(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let object_key = self.object_key(key)?;
        let response = self
            .bucket
            .put_object_with_content_type(&object_key, data, content_type)
            .await?;
        match response.status_code() {
            200..=299 => Ok(()),
            status => Err(StorageError::Status { key: object_key, status }),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let object_key = self.object_key(key)?;
        let response = self.bucket.get_object(&object_key).await?;
        match response.status_code() {
            200..=299 => Ok(Some(response.to_vec())),
            404 => Ok(None),
            status => Err(StorageError::Status { key: object_key, status }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let object_key = self.object_key(key)?;
        let (_, status) = self.bucket.head_object(&object_key).await?;
        match status {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => Err(StorageError::Status { key: object_key, status }),
        }
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let object_prefix = format!("{}/", self.object_key(prefix)?);
        let pages = self.bucket.list(object_prefix, None).await?;
        for object in pages.into_iter().flat_map(|page| page.contents) {
            self.bucket.delete_object(&object.key).await?;
        }
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("r2://{}/{}/{}", self.bucket.name(), self.prefix, key)
    }
}

/// Build the artifact store selected by `ARTIFACT_BACKEND`.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StorageError> {
    match config.artifact_backend {
        ArtifactBackend::Local => Ok(Arc::new(LocalArtifactStore::new(&config.snapshot_dir))),
        ArtifactBackend::R2 => {
            let require = |value: &Option<String>, name: &str| {
                value
                    .clone()
                    .ok_or_else(|| StorageError::Config(format!("{} is required for the r2 backend", name)))
            };
            let store = R2ArtifactStore::new(
                &require(&config.r2_bucket, "R2_BUCKET")?,
                &require(&config.r2_endpoint, "R2_ENDPOINT")?,
                &require(&config.r2_access_key, "R2_ACCESS_KEY")?,
                &require(&config.r2_secret_key, "R2_SECRET_KEY")?,
                &config.r2_prefix,
            )?;
            Ok(Arc::new(store))
        }
    }
}
