use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle status of a snapshot.
///
/// `Processing` is the only non-terminal state. A row leaves it exactly once.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotStatus {
    Processing,
    Completed,
    Failed,
}

impl SnapshotStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SnapshotStatus::Processing)
    }
}

/// One captured, timestamped copy of a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub timestamp: String,
    pub title: Option<String>,
    pub status: SnapshotStatus,
    /// Size of the stored HTML in MB, rounded to 2 decimals.
    pub size: Option<f64>,
    pub content_preview: Option<String>,
    pub snapshot_path: Option<String>,
    pub screenshot_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row inserted by the dispatcher before the capture job is queued.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub url: String,
    pub domain: String,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
}

impl NewSnapshot {
    /// A new processing row keyed by the epoch second of `now`.
    pub fn at(url: impl Into<String>, domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
            timestamp: now.timestamp().to_string(),
            created_at: now,
        }
    }
}

/// Fields written when a capture completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCapture {
    pub title: String,
    pub size: f64,
    pub content_preview: String,
    pub snapshot_path: String,
    pub screenshot_path: Option<String>,
}

/// Size buckets used when browsing an archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SizeClass {
    /// Under 1 MB.
    Small,
    /// 1 to 5 MB inclusive.
    Medium,
    /// Over 5 MB.
    Large,
}

impl SizeClass {
    pub fn contains(self, size_mb: f64) -> bool {
        match self {
            SizeClass::Small => size_mb < 1.0,
            SizeClass::Medium => (1.0..=5.0).contains(&size_mb),
            SizeClass::Large => size_mb > 5.0,
        }
    }
}

/// Filtered scan over the snapshot store. Unset fields do not constrain the scan.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub domain: Option<String>,
    pub status: Option<SnapshotStatus>,
    pub timestamps: Option<BTreeSet<String>>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub size: Option<SizeClass>,
    /// Case-insensitive substring match against `content_preview`.
    pub content_contains: Option<String>,
}

impl SnapshotFilter {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: SnapshotStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_timestamps<I, S>(mut self, timestamps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamps = Some(timestamps.into_iter().map(Into::into).collect());
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    /// Whether `snapshot` satisfies every set constraint.
    ///
    /// Used by the in-memory store; the PostgreSQL store expresses the same
    /// predicate in SQL.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        if let Some(domain) = &self.domain {
            if &snapshot.domain != domain {
                return false;
            }
        }
        if let Some(status) = self.status {
            if snapshot.status != status {
                return false;
            }
        }
        if let Some(timestamps) = &self.timestamps {
            if !timestamps.contains(&snapshot.timestamp) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if snapshot.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if snapshot.created_at >= before {
                return false;
            }
        }
        if let Some(class) = self.size {
            match snapshot.size {
                Some(size) if class.contains(size) => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.content_contains {
            let needle = needle.to_lowercase();
            match &snapshot.content_preview {
                Some(preview) if preview.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(status: SnapshotStatus, size: Option<f64>) -> Snapshot {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Snapshot {
            id: 1,
            url: "https://example.com/".to_string(),
            domain: "example.com".to_string(),
            timestamp: at.timestamp().to_string(),
            title: None,
            status,
            size,
            content_preview: size.map(|_| "Example Domain illustrative".to_string()),
            snapshot_path: None,
            screenshot_path: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!(SnapshotStatus::Completed.to_string(), "completed");
        assert_eq!(
            "processing".parse::<SnapshotStatus>().unwrap(),
            SnapshotStatus::Processing
        );
        assert!("archived".parse::<SnapshotStatus>().is_err());
        assert!(!SnapshotStatus::Processing.is_terminal());
        assert!(SnapshotStatus::Failed.is_terminal());
    }

    #[test]
    fn test_size_class_boundaries() {
        assert!(SizeClass::Small.contains(0.99));
        assert!(SizeClass::Medium.contains(1.0));
        assert!(SizeClass::Medium.contains(5.0));
        assert!(SizeClass::Large.contains(5.01));
        assert!(!SizeClass::Small.contains(1.0));
    }

    #[test]
    fn test_new_snapshot_timestamp_is_epoch_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let new = NewSnapshot::at("http://example.com", "example.com", now);
        assert_eq!(new.timestamp, now.timestamp().to_string());
        assert_eq!(new.created_at, now);
    }

    #[test]
    fn test_filter_matches_all_constraints() {
        let s = snapshot(SnapshotStatus::Completed, Some(1.2));

        assert!(SnapshotFilter::default().matches(&s));
        assert!(SnapshotFilter::for_domain("example.com")
            .with_status(SnapshotStatus::Completed)
            .with_timestamps([s.timestamp.clone()])
            .matches(&s));
        assert!(!SnapshotFilter::for_domain("example.org").matches(&s));
        assert!(!SnapshotFilter::default()
            .with_timestamps(["1"])
            .matches(&s));
        assert!(!SnapshotFilter::default()
            .created_before(s.created_at)
            .matches(&s));

        let by_size = SnapshotFilter {
            size: Some(SizeClass::Medium),
            ..SnapshotFilter::default()
        };
        assert!(by_size.matches(&s));
        assert!(!by_size.matches(&snapshot(SnapshotStatus::Processing, None)));

        let by_content = SnapshotFilter {
            content_contains: Some("EXAMPLE".to_string()),
            ..SnapshotFilter::default()
        };
        assert!(by_content.matches(&s));
    }
}
