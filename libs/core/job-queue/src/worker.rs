//! Worker loop: claims due jobs, dispatches them by kind and records the
//! outcome in the store.

use crate::clock::Clock;
use crate::config::WorkerConfig;
use crate::error::{HandlerError, QueueError, StoreError};
use crate::job::{Job, JobState};
use crate::kind::JobKind;
use crate::metrics;
use crate::registry::HandlerRegistry;
use crate::store::JobStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Runs single attempts; cheap to clone into spawned tasks
struct Executor<K: JobKind> {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry<K>>,
    job_timeout: Duration,
}

impl<K: JobKind> Clone for Executor<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            job_timeout: self.job_timeout,
        }
    }
}

impl<K: JobKind> Executor<K> {
    async fn execute(&self, job: Job) -> Result<Job, StoreError> {
        let span = info_span!("job", job_id = %job.id, kind = %job.kind, attempt = job.attempts);
        self.execute_inner(job).instrument(span).await
    }

    async fn execute_inner(&self, job: Job) -> Result<Job, StoreError> {
        let lease = job.lease();
        let started = Instant::now();
        metrics::job_claimed(&job.kind);

        let handler = match self.registry.resolve(&job.kind) {
            Ok((_, handler)) => handler,
            Err(e) => {
                error!(error = %e, "No handler for job kind, abandoning");
                let result = self.store.abandon(lease, &e.to_string()).await;
                self.record(&job, &result, started);
                return result;
            }
        };

        debug!(handler = handler.name(), "Executing job");
        let outcome = match tokio::time::timeout(self.job_timeout, handler.handle(&job)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HandlerError::Timeout(self.job_timeout)),
        };

        let result = match &outcome {
            Ok(()) => self.store.complete(lease).await,
            Err(e) => {
                metrics::handler_error(&job.kind, e.category());
                if e.is_retryable() {
                    self.store.fail(lease, &e.to_string()).await
                } else {
                    self.store.discard(lease, &e.to_string()).await
                }
            }
        };

        self.record(&job, &result, started);
        result
    }

    fn record(&self, job: &Job, result: &Result<Job, StoreError>, started: Instant) {
        let updated = match result {
            Ok(updated) => updated,
            Err(e) if e.is_lease_lost() => {
                warn!("Lease lost before the outcome was recorded");
                return;
            }
            Err(e) => {
                metrics::storage_error("resolve");
                error!(error = %e, "Failed to record job outcome, it will be recovered after the lease expires");
                return;
            }
        };

        let elapsed = started.elapsed();
        let error = updated.last_error.as_deref().unwrap_or_default();
        let outcome = match updated.state {
            JobState::Succeeded => {
                info!(duration_ms = elapsed.as_millis() as u64, "Job completed");
                "succeeded"
            }
            JobState::Pending | JobState::Delayed => {
                warn!(error, next_attempt_at = %updated.not_before, "Job failed, retry scheduled");
                "retried"
            }
            JobState::Failed => {
                error!(error, "Job failed permanently");
                "failed"
            }
            JobState::Abandoned => {
                error!(error, attempts = updated.attempts, "Job abandoned");
                "abandoned"
            }
            JobState::Running => "running",
        };

        metrics::job_finished(&job.kind, outcome, elapsed);
    }
}

/// Pool of concurrent job executions over one store
pub struct Worker<K: JobKind> {
    executor: Executor<K>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
}

impl<K: JobKind> Worker<K> {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: HandlerRegistry<K>,
        clock: Arc<dyn Clock>,
        mut config: WorkerConfig,
    ) -> Self {
        let lease_timeout = config.effective_lease_timeout();
        if lease_timeout != config.lease_timeout {
            warn!(
                lease_timeout_ms = config.lease_timeout.as_millis() as u64,
                job_timeout_ms = config.job_timeout.as_millis() as u64,
                effective_ms = lease_timeout.as_millis() as u64,
                "Lease timeout does not outlive the job timeout, extending it"
            );
            config.lease_timeout = lease_timeout;
        }

        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            executor: Executor {
                store,
                registry: Arc::new(registry),
                job_timeout: config.job_timeout,
            },
            clock,
            config,
            semaphore,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Claim and execute at most one job inline, returning it in its new state
    pub async fn run_once(&self) -> Result<Option<Job>, QueueError> {
        let Some(job) = self.executor.store.claim_next(&self.config.worker_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.executor.execute(job).await?))
    }

    /// Requeue or abandon jobs whose claim outlived the lease timeout
    pub async fn recover_stale(&self) -> Result<usize, QueueError> {
        let lease = TimeDelta::from_std(self.config.lease_timeout).unwrap_or(TimeDelta::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(lease)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let recovered = self.executor.store.recover_stale(cutoff).await?;
        for job in &recovered {
            warn!(
                job_id = %job.id,
                kind = %job.kind,
                attempts = job.attempts,
                state = %job.state,
                "Recovered orphaned job"
            );
        }
        if !recovered.is_empty() {
            metrics::jobs_recovered(recovered.len());
        }

        Ok(recovered.len())
    }

    /// Run until `shutdown` turns true (or its sender is dropped), then drain
    /// in-flight jobs.
    ///
    /// Refuses to start unless every job kind has a handler.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        self.executor.registry.validate()?;

        info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            job_timeout_ms = self.config.job_timeout.as_millis() as u64,
            lease_timeout_ms = self.config.lease_timeout.as_millis() as u64,
            "Starting job worker"
        );

        let mut in_flight = JoinSet::new();
        let mut consecutive_errors: u32 = 0;
        let mut last_recovery: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            reap_finished(&mut in_flight);

            if last_recovery.is_none_or(|at| at.elapsed() >= self.config.recovery_interval) {
                if let Err(e) = self.recover_stale().await {
                    metrics::storage_error("recover");
                    warn!(error = %e, "Stale job recovery failed");
                }
                last_recovery = Some(Instant::now());
            }

            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_requested(&mut shutdown) => break,
            };

            match self.executor.store.claim_next(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Job store recovered");
                        consecutive_errors = 0;
                    }

                    let executor = self.executor.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let _ = executor.execute(job).await;
                    });
                    metrics::in_flight(in_flight.len());
                }
                Ok(None) => {
                    drop(permit);
                    consecutive_errors = 0;
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    consecutive_errors += 1;
                    metrics::storage_error("claim");

                    let cooldown = self.config.cooldown_for(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Failed to claim job, backing off"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(cooldown) => {}
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Waiting for in-flight jobs");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
            metrics::in_flight(in_flight.len());
        }

        info!("Job worker stopped");
        Ok(())
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Collect finished job tasks and report how many are still running
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    while let Some(joined) = in_flight.try_join_next() {
        log_join(joined);
    }
    metrics::in_flight(in_flight.len());
    in_flight.len()
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Job task panicked");
    }
}
