use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use std::collections::BTreeSet;

use crate::app_state::AppState;
use crate::models::archive::{
    ArchiveRequest, ArchiveResponse, BulkDeleteRequest, DeleteReport, DomainSnapshots, ListQuery,
};
use crate::models::snapshot::{Snapshot, SnapshotStatus};
use crate::routes::ApiError;

/// POST /api/v1/archive: queue a capture of a URL.
pub async fn submit_archive(
    State(state): State<AppState>,
    Json(request): Json<ArchiveRequest>,
) -> Result<(StatusCode, Json<ArchiveResponse>), ApiError> {
    request.validate()?;
    let submission = state.dispatcher.submit(&request.url).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ArchiveResponse {
            job_id: submission.job_id,
            snapshot_id: submission.snapshot_id,
            domain: submission.domain,
            timestamp: submission.timestamp,
            status: SnapshotStatus::Processing,
        }),
    ))
}

/// GET /api/v1/snapshots/{id}: poll a snapshot's status.
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Snapshot>, ApiError> {
    state
        .archive
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Snapshot {} not found", id)))
}

/// GET /api/v1/archive/{domain}: list a domain's snapshots.
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DomainSnapshots>, ApiError> {
    query.validate()?;
    let snapshots = state.archive.list(&domain, query).await?;

    Ok(Json(DomainSnapshots {
        domain,
        total: snapshots.len(),
        snapshots,
    }))
}

/// GET /api/v1/archive/{domain}/{timestamp}: stored HTML.
pub async fn view_snapshot(
    State(state): State<AppState>,
    Path((domain, timestamp)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let html = state.archive.read_html(&domain, &timestamp).await?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html))
}

/// GET /api/v1/archive/{domain}/{timestamp}/screenshot
pub async fn view_screenshot(
    State(state): State<AppState>,
    Path((domain, timestamp)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let png = state.archive.read_screenshot(&domain, &timestamp).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// DELETE /api/v1/archive/{domain}/{timestamp}
pub async fn delete_snapshot(
    State(state): State<AppState>,
    Path((domain, timestamp)): Path<(String, String)>,
) -> Result<Json<DeleteReport>, ApiError> {
    let report = state
        .archive
        .delete(&domain, &BTreeSet::from([timestamp.clone()]))
        .await?;

    if report.deleted == 0 && report.skipped_processing == 0 {
        return Err(ApiError::not_found(format!(
            "Snapshot not found: {}/{}",
            domain, timestamp
        )));
    }
    if report.deleted == 0 {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "Snapshot is still being captured",
        ));
    }
    Ok(Json(report))
}

/// POST /api/v1/archive/{domain}/delete: delete several snapshots.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<DeleteReport>, ApiError> {
    request.validate()?;
    let timestamps: BTreeSet<String> = request.timestamps.into_iter().collect();
    let report = state.archive.delete(&domain, &timestamps).await?;
    Ok(Json(report))
}
