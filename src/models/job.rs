use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capture job payload serialized into the queue.
///
/// `domain` and `timestamp` are fixed at dispatch time so that every
/// delivery of the job writes to the same artifact directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureJob {
    pub job_id: Uuid,
    pub snapshot_id: i64,
    pub url: String,
    pub domain: String,
    pub timestamp: String,
}

/// Handle returned to the caller of a capture request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub job_id: Uuid,
    pub snapshot_id: i64,
    pub domain: String,
    pub timestamp: String,
}
