use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Write};
use std::sync::Arc;
use strum::{Display, EnumString};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::snapshot::{Snapshot, SnapshotFilter, SnapshotStatus};
use crate::services::storage::{self, ArtifactStore, StorageError};
use crate::services::store::{SnapshotStore, StoreError};

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    #[default]
    Zip,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Zip => "zip",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Zip => "application/zip",
        }
    }
}

/// A serialized export ready to be downloaded.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Snapshots included.
    pub count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No completed snapshots found for {domain}")]
    NotFound { domain: String },

    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP archive failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while exporting: {0}")]
    Io(#[from] std::io::Error),
}

/// One snapshot as it appears in JSON exports and ZIP `metadata.json`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExportRecord {
    pub timestamp: String,
    pub url: String,
    pub title: Option<String>,
    pub size: Option<f64>,
    pub domain: String,
    pub status: SnapshotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ExportRecord {
    fn from_snapshot(snapshot: &Snapshot, with_created_at: bool) -> Self {
        Self {
            timestamp: snapshot.timestamp.clone(),
            url: snapshot.url.clone(),
            title: snapshot.title.clone(),
            size: snapshot.size,
            domain: snapshot.domain.clone(),
            status: snapshot.status,
            created_at: with_created_at.then_some(snapshot.created_at),
        }
    }
}

/// Download name: `{domain}_snapshots_{unix}.{ext}`.
pub fn export_filename(domain: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("{}_snapshots_{}.{}", domain, now.timestamp(), format.extension())
}

pub fn to_json(snapshots: &[Snapshot]) -> Result<Vec<u8>, ExportError> {
    let records: Vec<ExportRecord> = snapshots
        .iter()
        .map(|s| ExportRecord::from_snapshot(s, true))
        .collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

pub fn to_csv(snapshots: &[Snapshot]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Domain",
        "Timestamp",
        "URL",
        "Title",
        "Size (MB)",
        "Status",
        "Created At",
    ])?;

    for s in snapshots {
        let size = s.size.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            s.domain.as_str(),
            s.timestamp.as_str(),
            s.url.as_str(),
            s.title.as_deref().unwrap_or(""),
            size.as_str(),
            s.status.as_ref(),
            s.created_at.to_rfc3339().as_str(),
        ])?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Filters completed snapshots by timestamp and serializes them.
pub struct ExportEngine {
    store: Arc<dyn SnapshotStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ExportEngine {
    pub fn new(store: Arc<dyn SnapshotStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    /// Completed snapshots of `domain` whose timestamp is in `timestamps`,
    /// ordered by timestamp then id.
    pub async fn select(
        &self,
        domain: &str,
        timestamps: &BTreeSet<String>,
    ) -> Result<Vec<Snapshot>, ExportError> {
        if timestamps.is_empty() {
            return Ok(Vec::new());
        }
        let filter = SnapshotFilter::for_domain(domain)
            .with_status(SnapshotStatus::Completed)
            .with_timestamps(timestamps.iter().cloned());

        let mut snapshots = self.store.find(&filter).await?;
        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    pub async fn export(
        &self,
        domain: &str,
        timestamps: &BTreeSet<String>,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ExportError> {
        let snapshots = self.select(domain, timestamps).await?;
        if snapshots.is_empty() {
            return Err(ExportError::NotFound {
                domain: domain.to_string(),
            });
        }

        let bytes = match format {
            ExportFormat::Json => to_json(&snapshots)?,
            ExportFormat::Csv => to_csv(&snapshots)?,
            ExportFormat::Zip => self.to_zip(&snapshots).await?,
        };

        tracing::info!(
            domain = %domain,
            format = %format,
            count = snapshots.len(),
            bytes = bytes.len(),
            "Export created"
        );

        Ok(ExportArtifact {
            filename: export_filename(domain, format, Utc::now()),
            content_type: format.content_type(),
            bytes,
            count: snapshots.len(),
        })
    }

    /// DEFLATE archive of each snapshot's artifacts plus a root `metadata.json`.
    ///
    /// Snapshots captured in the same second share artifact keys; each key is
    /// written once while every row stays in the metadata. Screenshots are
    /// included only for rows that recorded one, and artifacts missing from
    /// storage are left out.
    async fn to_zip(&self, snapshots: &[Snapshot]) -> Result<Vec<u8>, ExportError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written = HashSet::new();

        for s in snapshots {
            let mut entries = vec![storage::html_key(&s.domain, &s.timestamp)];
            if s.screenshot_path.is_some() {
                entries.push(storage::screenshot_key(&s.domain, &s.timestamp));
            }
            for key in entries {
                if written.contains(&key) {
                    continue;
                }
                match self.artifacts.read(&key).await? {
                    Some(bytes) => {
                        zip.start_file(key.as_str(), options)?;
                        zip.write_all(&bytes)?;
                        written.insert(key);
                    }
                    None => {
                        tracing::debug!(key = %key, "Artifact missing, left out of export");
                    }
                }
            }
        }

        let metadata: Vec<ExportRecord> = snapshots
            .iter()
            .map(|s| ExportRecord::from_snapshot(s, false))
            .collect();
        zip.start_file("metadata.json", options)?;
        zip.write_all(&serde_json::to_vec_pretty(&metadata)?)?;

        Ok(zip.finish()?.into_inner())
    }
}
