use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::snapshot::{SizeClass, Snapshot, SnapshotStatus};
use crate::services::export::ExportFormat;

/// Request to capture a URL.
#[derive(Debug, Deserialize, Validate)]
pub struct ArchiveRequest {
    #[garde(length(min = 1, max = 2048))]
    pub url: String,
}

/// Response after a capture request is accepted.
#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub job_id: Uuid,
    pub snapshot_id: i64,
    pub domain: String,
    pub timestamp: String,
    pub status: SnapshotStatus,
}

/// Query string accepted when listing a domain's snapshots.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListQuery {
    #[garde(skip)]
    pub status: Option<SnapshotStatus>,
    #[garde(skip)]
    pub size: Option<SizeClass>,
    #[garde(skip)]
    pub from: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub to: Option<DateTime<Utc>>,
    #[garde(length(min = 1, max = 200))]
    pub q: Option<String>,
}

/// Listing of one domain's snapshots.
#[derive(Debug, Serialize)]
pub struct DomainSnapshots {
    pub domain: String,
    pub snapshots: Vec<Snapshot>,
    pub total: usize,
}

/// Body of a bulk delete request.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[garde(length(min = 1, max = 1000))]
    pub timestamps: Vec<String>,
}

/// Result of an explicit delete.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    /// Rows left in place because a capture is still running.
    pub skipped_processing: usize,
}

/// Body of an export request.
#[derive(Debug, Deserialize, Validate)]
pub struct ExportRequest {
    #[garde(length(min = 1, max = 1000))]
    pub timestamps: Vec<String>,
    #[serde(default)]
    #[garde(skip)]
    pub format: ExportFormat,
}
