pub mod archive;
pub mod export;
pub mod health;
pub mod metrics;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app_state::AppState;
use crate::services::archive::ArchiveError;
use crate::services::dispatcher::DispatchError;
use crate::services::export::ExportError;

/// Health and archive API routes, without the metrics endpoint or middleware.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/archive", post(archive::submit_archive))
        .route("/api/v1/archive/{domain}", get(archive::list_snapshots))
        .route(
            "/api/v1/archive/{domain}/{timestamp}",
            get(archive::view_snapshot).delete(archive::delete_snapshot),
        )
        .route(
            "/api/v1/archive/{domain}/{timestamp}/screenshot",
            get(archive::view_screenshot),
        )
        .route("/api/v1/archive/{domain}/delete", post(archive::bulk_delete))
        .route("/api/v1/snapshots/{id}", get(archive::get_snapshot))
        .route("/api/v1/export/{domain}", post(export::export_snapshots))
        .with_state(state)
}

/// Error returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(error: &dyn std::error::Error) -> Self {
        tracing::error!(error = %error, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, report.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match &error {
            DispatchError::InvalidUrl { .. } => Self::bad_request(error.to_string()),
            DispatchError::QueueUnavailable { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
            }
            DispatchError::Store(_) => Self::internal(&error),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(error: ArchiveError) -> Self {
        match &error {
            ArchiveError::NotFound { .. } => Self::not_found(error.to_string()),
            _ => Self::internal(&error),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(error: ExportError) -> Self {
        match &error {
            ExportError::NotFound { .. } => Self::not_found(error.to_string()),
            _ => Self::internal(&error),
        }
    }
}
