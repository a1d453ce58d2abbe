//! Durable job storage.
//!
//! A store owns the retry state machine: `fail` decides between another
//! attempt and ABANDONED using the store's [`RetryPolicy`](crate::RetryPolicy).

mod memory;
mod redis;

pub use self::memory::MemoryJobStore;
pub use self::redis::{RedisJobStore, RedisKeys};

use crate::error::StoreResult;
use crate::job::{Job, JobId, JobState, Lease, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job counts by state. Queued jobs count as PENDING once due and as DELAYED
/// while `not_before` is still ahead, regardless of the stored state label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub pending: u64,
    pub delayed: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub abandoned: u64,
}

impl JobStats {
    pub fn total(&self) -> u64 {
        self.pending + self.delayed + self.running + self.succeeded + self.failed + self.abandoned
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job, PENDING or DELAYED depending on `not_before`
    async fn enqueue(&self, job: NewJob) -> StoreResult<JobId>;

    /// Atomically claim the earliest due job. Never blocks waiting for work.
    async fn claim_next(&self, worker_id: &str) -> StoreResult<Option<Job>>;

    /// RUNNING → SUCCEEDED
    async fn complete(&self, lease: Lease) -> StoreResult<Job>;

    /// Retryable failure: back to PENDING with backoff or ABANDONED at the bound
    async fn fail(&self, lease: Lease, error: &str) -> StoreResult<Job>;

    /// RUNNING → ABANDONED without further attempts
    async fn abandon(&self, lease: Lease, reason: &str) -> StoreResult<Job>;

    /// Permanent failure: RUNNING → FAILED
    async fn discard(&self, lease: Lease, reason: &str) -> StoreResult<Job>;

    /// Push RUNNING jobs claimed at or before `older_than` through the failure path
    async fn recover_stale(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Job>>;

    /// Delete a PENDING/DELAYED job. Returns false if it is running, finished or unknown.
    async fn cancel(&self, id: JobId) -> StoreResult<bool>;

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>>;

    async fn list(&self, state: JobState, limit: usize) -> StoreResult<Vec<Job>>;

    async fn stats(&self) -> StoreResult<JobStats>;

    /// Cheap backend round trip for readiness probes
    async fn ping(&self) -> StoreResult<()>;
}
