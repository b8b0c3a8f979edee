use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::job::CaptureJob;

const QUEUE_KEY: &str = "archive_hub:capture_jobs";
const PROCESSING_KEY: &str = "archive_hub:capture_processing";

/// At-least-once work queue for capture jobs.
///
/// A dequeued job stays in flight until [`CaptureQueue::ack`] is called.
/// Unacknowledged jobs are handed out again by
/// [`CaptureQueue::redeliver_unacked`].
#[async_trait]
pub trait CaptureQueue: Send + Sync {
    async fn enqueue(&self, job: &CaptureJob) -> Result<(), QueueError>;

    /// Take the next job, if any, moving it to the in-flight set.
    async fn dequeue(&self) -> Result<Option<CaptureJob>, QueueError>;

    /// Remove a job from the in-flight set.
    async fn ack(&self, job: &CaptureJob) -> Result<(), QueueError>;

    /// Move every in-flight job back to the pending queue. Returns the count.
    async fn redeliver_unacked(&self) -> Result<u64, QueueError>;

    /// Pending jobs.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Connectivity check for health probes.
    async fn ping(&self) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable")]
    Unavailable,
}

/// Redis-backed reliable queue (`RPOPLPUSH` into a processing list).
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl CaptureQueue for RedisQueue {
    async fn enqueue(&self, job: &CaptureJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<CaptureJob>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => {
                let job: CaptureJob = serde_json::from_str(&payload)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, job: &CaptureJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    async fn redeliver_unacked(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut moved = 0;
        loop {
            let payload: Option<String> = conn.rpoplpush(PROCESSING_KEY, QUEUE_KEY).await?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process queue with the same delivery semantics as [`RedisQueue`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<MemoryLists>,
    unavailable: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryLists {
    pending: VecDeque<CaptureJob>,
    in_flight: Vec<CaptureJob>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable broker: every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Jobs dequeued but not yet acknowledged.
    pub fn in_flight(&self) -> Vec<CaptureJob> {
        self.lists().in_flight.clone()
    }

    fn lists(&self) -> MutexGuard<'_, MemoryLists> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(QueueError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CaptureQueue for MemoryQueue {
    async fn enqueue(&self, job: &CaptureJob) -> Result<(), QueueError> {
        self.check_available()?;
        self.lists().pending.push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<CaptureJob>, QueueError> {
        self.check_available()?;
        let mut lists = self.lists();
        let job = lists.pending.pop_front();
        if let Some(job) = &job {
            lists.in_flight.push(job.clone());
        }
        Ok(job)
    }

    async fn ack(&self, job: &CaptureJob) -> Result<(), QueueError> {
        self.check_available()?;
        let mut lists = self.lists();
        if let Some(pos) = lists.in_flight.iter().position(|j| j == job) {
            lists.in_flight.remove(pos);
        }
        Ok(())
    }

    async fn redeliver_unacked(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        let mut lists = self.lists();
        let jobs: Vec<CaptureJob> = lists.in_flight.drain(..).collect();
        let moved = jobs.len() as u64;
        lists.pending.extend(jobs);
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        self.check_available()?;
        Ok(self.lists().pending.len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}
