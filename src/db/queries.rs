use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::models::snapshot::{
    CompletedCapture, NewSnapshot, SizeClass, Snapshot, SnapshotFilter, SnapshotStatus,
};
use crate::services::store::{SnapshotStore, StoreError};

const SNAPSHOT_COLUMNS: &str = r#"id, url, domain, "timestamp", title, status, size,
    content_preview, snapshot_path, screenshot_path, created_at, updated_at"#;

fn snapshot_from_row(row: &PgRow) -> Result<Snapshot, StoreError> {
    let id: i64 = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<SnapshotStatus>()
        .map_err(|_| StoreError::Corrupt {
            id,
            reason: format!("unknown status '{}'", status_str),
        })?;

    Ok(Snapshot {
        id,
        url: row.try_get("url")?,
        domain: row.try_get("domain")?,
        timestamp: row.try_get("timestamp")?,
        title: row.try_get("title")?,
        status,
        size: row.try_get("size")?,
        content_preview: row.try_get("content_preview")?,
        snapshot_path: row.try_get("snapshot_path")?,
        screenshot_path: row.try_get("screenshot_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new snapshot in `processing` state
pub async fn insert_snapshot(pool: &PgPool, new: &NewSnapshot) -> Result<Snapshot, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO snapshots (url, domain, "timestamp", status, created_at, updated_at)
        VALUES ($1, $2, $3, 'processing', $4, $4)
        RETURNING {SNAPSHOT_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(&new.url)
        .bind(&new.domain)
        .bind(&new.timestamp)
        .bind(new.created_at)
        .fetch_one(pool)
        .await?;

    snapshot_from_row(&row)
}

/// Get a snapshot by ID
pub async fn get_snapshot(pool: &PgPool, id: i64) -> Result<Option<Snapshot>, StoreError> {
    let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(snapshot_from_row).transpose()
}

/// Filtered scan, newest first
pub async fn find_snapshots(
    pool: &PgPool,
    filter: &SnapshotFilter,
) -> Result<Vec<Snapshot>, StoreError> {
    let mut query = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE TRUE"
    ));
    push_filter(&mut query, filter);
    query.push(" ORDER BY created_at DESC, id DESC");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(snapshot_from_row).collect()
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &SnapshotFilter) {
    if let Some(domain) = &filter.domain {
        query.push(" AND domain = ").push_bind(domain.clone());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(timestamps) = &filter.timestamps {
        let timestamps: Vec<String> = timestamps.iter().cloned().collect();
        query
            .push(r#" AND "timestamp" = ANY("#)
            .push_bind(timestamps)
            .push(")");
    }
    if let Some(after) = filter.created_after {
        query.push(" AND created_at >= ").push_bind(after);
    }
    if let Some(before) = filter.created_before {
        query.push(" AND created_at < ").push_bind(before);
    }
    match filter.size {
        Some(SizeClass::Small) => {
            query.push(" AND size < 1");
        }
        Some(SizeClass::Medium) => {
            query.push(" AND size >= 1 AND size <= 5");
        }
        Some(SizeClass::Large) => {
            query.push(" AND size > 5");
        }
        None => {}
    }
    if let Some(needle) = &filter.content_contains {
        query
            .push(" AND content_preview ILIKE '%' || ")
            .push_bind(escape_like(needle))
            .push(" || '%'");
    }
}

/// Escape LIKE wildcards so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Record a completed capture
pub async fn complete_snapshot(
    pool: &PgPool,
    id: i64,
    capture: &CompletedCapture,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE snapshots
        SET status = 'completed',
            title = $2,
            size = $3,
            content_preview = $4,
            snapshot_path = $5,
            screenshot_path = $6,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('processing', 'completed')
        "#,
    )
    .bind(id)
    .bind(&capture.title)
    .bind(capture.size)
    .bind(&capture.content_preview)
    .bind(&capture.snapshot_path)
    .bind(&capture.screenshot_path)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move a processing snapshot to failed
pub async fn fail_snapshot(pool: &PgPool, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE snapshots
        SET status = 'failed',
            size = NULL,
            content_preview = NULL,
            snapshot_path = NULL,
            screenshot_path = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete a snapshot record
pub async fn delete_snapshot(pool: &PgPool, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM snapshots WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// PostgreSQL-backed [`SnapshotStore`].
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn insert(&self, snapshot: &NewSnapshot) -> Result<Snapshot, StoreError> {
        insert_snapshot(&self.pool, snapshot).await
    }

    async fn get(&self, id: i64) -> Result<Option<Snapshot>, StoreError> {
        get_snapshot(&self.pool, id).await
    }

    async fn find(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>, StoreError> {
        find_snapshots(&self.pool, filter).await
    }

    async fn mark_completed(
        &self,
        id: i64,
        capture: &CompletedCapture,
    ) -> Result<bool, StoreError> {
        complete_snapshot(&self.pool, id, capture).await
    }

    async fn mark_failed(&self, id: i64) -> Result<bool, StoreError> {
        fail_snapshot(&self.pool, id).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        delete_snapshot(&self.pool, id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done"), r"100\%\_done");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_filter_sql() {
        let filter = SnapshotFilter::for_domain("example.com")
            .with_status(SnapshotStatus::Completed)
            .with_timestamps(["1760659200"]);
        let mut query = QueryBuilder::<Postgres>::new("SELECT id FROM snapshots WHERE TRUE");
        push_filter(&mut query, &filter);
        assert_eq!(
            query.sql(),
            r#"SELECT id FROM snapshots WHERE TRUE AND domain = $1 AND status = $2 AND "timestamp" = ANY($3)"#
        );
    }
}
