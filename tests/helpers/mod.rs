//! Test helper utilities for E2E testing

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::fixtures::PageFixture;

/// Response from POST /api/v1/archive
#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveResponse {
    pub job_id: Uuid,
    pub snapshot_id: i64,
    pub domain: String,
    pub timestamp: String,
    pub status: String,
}

/// Response from GET /api/v1/snapshots/{id}
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub timestamp: String,
    pub title: Option<String>,
    pub status: String,
    pub size: Option<f64>,
    pub content_preview: Option<String>,
    pub snapshot_path: Option<String>,
    pub screenshot_path: Option<String>,
}

/// Submit a URL for capture
pub async fn submit_url(
    client: &reqwest::Client,
    base_url: &str,
    url: &str,
) -> Result<ArchiveResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/archive", base_url))
        .json(&serde_json::json!({ "url": url }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<ArchiveResponse>().await?)
}

/// Poll a snapshot until it leaves `processing` (with timeout)
pub async fn poll_snapshot(
    client: &reqwest::Client,
    base_url: &str,
    snapshot_id: i64,
    timeout_secs: u64,
) -> Result<SnapshotResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/snapshots/{}", base_url, snapshot_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let snapshot = response.json::<SnapshotResponse>().await?;

        match snapshot.status.as_str() {
            "completed" | "failed" => return Ok(snapshot),
            "processing" => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_millis(500)).await;
            }
            _ => {
                return Err(format!("Unknown snapshot status: {}", snapshot.status).into());
            }
        }
    }

    Err(format!("Snapshot did not finish within {} seconds", timeout_secs).into())
}

/// Wait for the worker to finish a capture; allows for the 60 s render deadline
pub async fn wait_for_capture(
    client: &reqwest::Client,
    base_url: &str,
    snapshot_id: i64,
) -> Result<SnapshotResponse, Box<dyn std::error::Error>> {
    poll_snapshot(client, base_url, snapshot_id, 120).await
}

/// Assert a finished snapshot matches its fixture
pub fn assert_capture(snapshot: &SnapshotResponse, fixture: &PageFixture) {
    assert_eq!(snapshot.domain, fixture.expected_domain, "domain for {}", fixture.url);

    if fixture.should_complete {
        assert_eq!(snapshot.status, "completed", "status for {}", fixture.url);
        assert!(snapshot.size.is_some(), "size set for {}", fixture.url);
        assert!(snapshot.snapshot_path.is_some(), "path set for {}", fixture.url);
        let preview = snapshot.content_preview.as_deref().unwrap_or_default();
        assert!(preview.chars().count() <= 1000, "preview capped for {}", fixture.url);
        if let Some(expected) = fixture.title_contains {
            let title = snapshot.title.as_deref().unwrap_or_default();
            assert!(
                title.contains(expected),
                "title '{}' should contain '{}'",
                title,
                expected
            );
        }
    } else {
        assert_eq!(snapshot.status, "failed", "status for {}", fixture.url);
        assert!(snapshot.size.is_none());
        assert!(snapshot.snapshot_path.is_none());
    }

    println!(
        "  ✓ {} - status: {}, size: {:?} MB",
        fixture.url, snapshot.status, snapshot.size
    );
}
