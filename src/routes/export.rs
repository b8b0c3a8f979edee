use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use std::collections::BTreeSet;

use crate::app_state::AppState;
use crate::models::archive::ExportRequest;
use crate::routes::ApiError;

/// POST /api/v1/export/{domain}: download selected snapshots as JSON, CSV or ZIP.
pub async fn export_snapshots(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(request): Json<ExportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;
    let timestamps: BTreeSet<String> = request.timestamps.into_iter().collect();
    let artifact = state
        .exporter
        .export(&domain, &timestamps, request.format)
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    ))
}
