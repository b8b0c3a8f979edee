use archive_hub::{
    config::AppConfig,
    db::{self, queries::PgSnapshotStore},
    routes::metrics::describe_metrics,
    services::{
        capture::{CaptureWorker, WorkerSettings},
        queue::{CaptureQueue, RedisQueue},
        render,
        retention::RetentionSweeper,
        storage,
        store::SnapshotStore,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting snapshot capture worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Capture and retention metrics are scraped from the worker itself
    let metrics_addr = config
        .worker_metrics_socket()
        .expect("Invalid worker metrics address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");
    describe_metrics();
    tracing::info!(addr = %metrics_addr, "Worker metrics listening");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let sizing = db::PoolSizing::for_workers(config.worker_concurrency);
    let db_pool = db::init_pool(&config.database_url, sizing)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!("Initializing services");
    let store: Arc<dyn SnapshotStore> = Arc::new(PgSnapshotStore::new(db_pool));
    let queue: Arc<dyn CaptureQueue> =
        Arc::new(RedisQueue::new(&config.redis_url).expect("Failed to initialize capture queue"));
    let artifacts = storage::from_config(&config).expect("Failed to initialize artifact storage");
    let renderer = render::from_config(&config).expect("Failed to initialize render client");

    if config.recover_in_flight {
        match queue.redeliver_unacked().await {
            Ok(0) => {}
            Ok(moved) => tracing::warn!(jobs = moved, "Re-queued jobs left in flight by a previous worker"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight jobs"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let settings = WorkerSettings::from_config(&config);
    for n in 0..config.worker_concurrency {
        let worker = CaptureWorker::new(
            store.clone(),
            queue.clone(),
            artifacts.clone(),
            renderer.clone(),
            settings,
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(
            async move { worker.run(shutdown).await }
                .instrument(tracing::info_span!("capture_worker", worker = n)),
        ));
    }

    let sweeper = RetentionSweeper::new(store.clone(), artifacts.clone(), config.retention_window());
    let interval = config.retention_interval();
    let shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(
        async move { sweeper.run(interval, shutdown).await }
            .instrument(tracing::info_span!("retention_sweeper")),
    ));

    tracing::info!(
        workers = config.worker_concurrency,
        retention_days = config.retention_days,
        "Worker ready, starting job processing loops"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested, finishing in-progress jobs");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    tracing::info!("Worker stopped");
}
