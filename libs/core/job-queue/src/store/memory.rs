use super::{JobStats, JobStore};
use crate::clock::Clock;
use crate::config::RetryPolicy;
use crate::error::{StoreError, StoreResult};
use crate::job::{Job, JobId, JobState, Lease, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Queued jobs ordered by due time; ties broken by the time-ordered id
    queue: BTreeSet<(DateTime<Utc>, JobId)>,
}

/// Single-process job store.
///
/// Every operation runs under one lock, which makes claim a plain
/// check-and-set. Used by tests and by single-node deployments that can
/// afford to lose queued work on restart.
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    available: AtomicBool,
}

impl MemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            retry,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a backend outage: while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        }
    }

    async fn resolve<F>(&self, lease: Lease, transition: F) -> StoreResult<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>),
    {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let job = inner
            .jobs
            .get_mut(&lease.job_id)
            .ok_or(StoreError::NotFound(lease.job_id))?;

        if !job.holds(&lease) {
            return Err(StoreError::LeaseLost {
                job_id: lease.job_id,
                attempt: lease.attempt,
            });
        }

        transition(job, now);
        if job.state.is_queued() {
            inner.queue.insert((job.not_before, job.id));
        }

        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, new_job: NewJob) -> StoreResult<JobId> {
        self.ensure_available()?;
        let job = Job::new(JobId::new(), new_job, self.retry.max_attempts, self.clock.now());
        let id = job.id;

        let mut inner = self.inner.lock().await;
        inner.queue.insert((job.not_before, id));
        inner.jobs.insert(id, job);

        Ok(id)
    }

    async fn claim_next(&self, worker_id: &str) -> StoreResult<Option<Job>> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        while let Some(&(not_before, id)) = inner.queue.first() {
            if not_before > now {
                break;
            }
            inner.queue.remove(&(not_before, id));

            match inner.jobs.get_mut(&id) {
                Some(job) if job.state.is_queued() => {
                    job.mark_claimed(worker_id, now);
                    debug!(job_id = %id, attempt = job.attempts, "Claimed job");
                    return Ok(Some(job.clone()));
                }
                _ => warn!(job_id = %id, "Dropping stale queue entry"),
            }
        }

        Ok(None)
    }

    async fn complete(&self, lease: Lease) -> StoreResult<Job> {
        self.resolve(lease, |job, now| job.mark_succeeded(now)).await
    }

    async fn fail(&self, lease: Lease, error: &str) -> StoreResult<Job> {
        let retry = self.retry.clone();
        self.resolve(lease, |job, now| job.mark_failed_attempt(error, &retry, now))
            .await
    }

    async fn abandon(&self, lease: Lease, reason: &str) -> StoreResult<Job> {
        self.resolve(lease, |job, now| job.mark_abandoned(reason, now))
            .await
    }

    async fn discard(&self, lease: Lease, reason: &str) -> StoreResult<Job> {
        self.resolve(lease, |job, now| job.mark_discarded(reason, now))
            .await
    }

    async fn recover_stale(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut recovered = Vec::new();

        for job in inner.jobs.values_mut() {
            let orphaned = job.state == JobState::Running
                && job.claimed_at.is_some_and(|claimed| claimed <= older_than);
            if !orphaned {
                continue;
            }

            let reason = format!(
                "lease expired: {} stopped responding",
                job.claimed_by.as_deref().unwrap_or("unknown worker")
            );
            job.mark_failed_attempt(&reason, &self.retry, now);
            if job.state.is_queued() {
                inner.queue.insert((job.not_before, job.id));
            }
            recovered.push(job.clone());
        }

        Ok(recovered)
    }

    async fn cancel(&self, id: JobId) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut inner = self.inner.lock().await;

        let key = match inner.jobs.get(&id) {
            Some(job) if job.state.is_queued() => (job.not_before, id),
            _ => return Ok(false),
        };

        inner.queue.remove(&key);
        inner.jobs.remove(&id);
        Ok(true)
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        self.ensure_available()?;
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, state: JobState, limit: usize) -> StoreResult<Vec<Job>> {
        self.ensure_available()?;
        let now = self.clock.now();
        let inner = self.inner.lock().await;

        let mut jobs: Vec<Job> = match state {
            JobState::Pending | JobState::Delayed => inner
                .queue
                .iter()
                .filter(|(not_before, _)| (*not_before <= now) == (state == JobState::Pending))
                .filter_map(|(_, id)| inner.jobs.get(id).cloned())
                .collect(),
            JobState::Running => {
                let mut running: Vec<Job> = inner
                    .jobs
                    .values()
                    .filter(|job| job.state == JobState::Running)
                    .cloned()
                    .collect();
                running.sort_by_key(|job| job.claimed_at);
                running
            }
            terminal => {
                let mut finished: Vec<Job> = inner
                    .jobs
                    .values()
                    .filter(|job| job.state == terminal)
                    .cloned()
                    .collect();
                finished.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                finished
            }
        };

        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        self.ensure_available()?;
        let now = self.clock.now();
        let inner = self.inner.lock().await;
        let mut stats = JobStats::default();

        for job in inner.jobs.values() {
            match job.state {
                JobState::Pending | JobState::Delayed if job.not_before <= now => {
                    stats.pending += 1
                }
                JobState::Pending | JobState::Delayed => stats.delayed += 1,
                JobState::Running => stats.running += 1,
                JobState::Succeeded => stats.succeeded += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Abandoned => stats.abandoned += 1,
            }
        }

        Ok(stats)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_available()
    }
}
