use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: Prometheus text exposition of the capture pipeline metrics.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "snapshot_jobs_submitted_total",
        "Capture jobs accepted and queued"
    );
    metrics::describe_counter!(
        "snapshot_dispatch_failures_total",
        "Capture requests whose job could not be queued"
    );
    metrics::describe_counter!(
        "snapshot_captures_completed_total",
        "Captures that reached the completed state"
    );
    metrics::describe_counter!(
        "snapshot_captures_failed_total",
        "Captures that failed, labelled by failure kind"
    );
    metrics::describe_histogram!(
        "snapshot_capture_seconds",
        "Time from render start to a completed snapshot"
    );
    metrics::describe_gauge!(
        "snapshot_queue_depth",
        "Capture jobs waiting in the queue"
    );
    metrics::describe_counter!(
        "retention_snapshots_deleted_total",
        "Snapshots removed by the retention sweeper"
    );
}
