use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection limits for one process's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    pub max_connections: u32,
    pub min_connections: u32,
}

impl PoolSizing {
    /// API server: request handlers and health checks share one pool.
    pub const API: Self = Self {
        max_connections: 20,
        min_connections: 2,
    };

    /// Worker process: two connections per capture worker and for the
    /// retention sweeper.
    pub fn for_workers(concurrency: usize) -> Self {
        let busy = u32::try_from(concurrency).unwrap_or(u32::MAX / 2).saturating_add(1);
        Self {
            max_connections: busy.saturating_mul(2),
            min_connections: 1,
        }
    }
}

/// Connect to the snapshot database.
pub async fn init_pool(database_url: &str, sizing: PoolSizing) -> Result<PgPool, sqlx::Error> {
    tracing::debug!(
        max_connections = sizing.max_connections,
        min_connections = sizing.min_connections,
        "Opening PostgreSQL pool"
    );
    PgPoolOptions::new()
        .max_connections(sizing.max_connections)
        .min_connections(sizing.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Apply the embedded `snapshots` schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;
