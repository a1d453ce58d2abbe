//! Queue and worker configuration

use std::time::Duration;
use uuid::Uuid;

/// Exponential backoff between attempts of a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total executions allowed, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay after the `attempts`-th failed execution: `base × 2^(attempts-1)`, capped
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s base, 60s cap
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Store-level settings shared by producers and workers
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Prefix of every Redis key the store touches
    pub key_prefix: String,
    pub retry: RetryPolicy,
}

impl QueueConfig {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("notifications")
    }
}

/// Time left after a handler timeout for its outcome to be recorded
pub const LEASE_MARGIN: Duration = Duration::from_secs(5);

/// Worker loop settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier recorded in `claimed_by`
    pub worker_id: String,
    /// Jobs executed concurrently (always at least 1)
    pub concurrency: usize,
    /// Wait between claims when the queue has nothing ready
    pub poll_interval: Duration,
    /// Upper bound on a single handler run
    pub job_timeout: Duration,
    /// RUNNING jobs claimed longer ago than this are presumed orphaned
    pub lease_timeout: Duration,
    /// How often orphaned claims are swept
    pub recovery_interval: Duration,
    /// First wait after a storage error; doubles per consecutive error
    pub storage_cooldown: Duration,
    pub max_storage_cooldown: Duration,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = interval;
        self
    }

    pub fn with_storage_cooldown(mut self, cooldown: Duration) -> Self {
        self.storage_cooldown = cooldown;
        self
    }

    /// Lease long enough to outlive any handler run plus [`LEASE_MARGIN`].
    ///
    /// A shorter lease would let recovery requeue a job whose handler is
    /// still running.
    pub fn effective_lease_timeout(&self) -> Duration {
        self.lease_timeout
            .max(self.job_timeout.saturating_add(LEASE_MARGIN))
    }

    /// Wait after `consecutive_errors` storage failures in a row
    pub fn cooldown_for(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(5);
        self.storage_cooldown
            .saturating_mul(1u32 << exponent)
            .min(self.max_storage_cooldown)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(30),
            lease_timeout: Duration::from_secs(300),
            recovery_interval: Duration::from_secs(30),
            storage_cooldown: Duration::from_secs(1),
            max_storage_cooldown: Duration::from_secs(30),
        }
    }
}

#[cfg(feature = "config")]
mod env {
    use super::*;
    use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};

    impl FromEnv for RetryPolicy {
        fn from_env() -> Result<Self, ConfigError> {
            let max_attempts: u32 = env_parse("QUEUE_MAX_ATTEMPTS", 3)?;
            if max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: "QUEUE_MAX_ATTEMPTS".into(),
                    details: "must be at least 1".into(),
                });
            }

            let base: u64 = env_parse("QUEUE_BASE_BACKOFF_MS", 1_000)?;
            let max: u64 = env_parse("QUEUE_MAX_BACKOFF_MS", 60_000)?;
            if max < base {
                return Err(ConfigError::Invalid {
                    key: "QUEUE_MAX_BACKOFF_MS".into(),
                    details: format!("{max} is below QUEUE_BASE_BACKOFF_MS ({base})"),
                });
            }

            Ok(Self::new(
                max_attempts,
                Duration::from_millis(base),
                Duration::from_millis(max),
            ))
        }
    }

    impl FromEnv for QueueConfig {
        fn from_env() -> Result<Self, ConfigError> {
            Ok(Self::new(env_or_default("QUEUE_KEY_PREFIX", "notifications"))
                .with_retry(RetryPolicy::from_env()?))
        }
    }

    impl FromEnv for WorkerConfig {
        fn from_env() -> Result<Self, ConfigError> {
            let defaults = WorkerConfig::default();
            let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
                env_parse(key, default.as_millis() as u64).map(Duration::from_millis)
            };

            let job_timeout = millis("WORKER_JOB_TIMEOUT_MS", defaults.job_timeout)?;
            let lease_timeout = millis("WORKER_LEASE_TIMEOUT_MS", defaults.lease_timeout)?;
            if lease_timeout < job_timeout.saturating_add(LEASE_MARGIN) {
                return Err(ConfigError::Invalid {
                    key: "WORKER_LEASE_TIMEOUT_MS".into(),
                    details: format!(
                        "{}ms must exceed WORKER_JOB_TIMEOUT_MS ({}ms) by at least {}ms",
                        lease_timeout.as_millis(),
                        job_timeout.as_millis(),
                        LEASE_MARGIN.as_millis()
                    ),
                });
            }

            Ok(Self {
                worker_id: env_optional("WORKER_ID").unwrap_or(defaults.worker_id),
                concurrency: env_parse("WORKER_CONCURRENCY", defaults.concurrency)?.max(1),
                poll_interval: millis("WORKER_POLL_INTERVAL_MS", defaults.poll_interval)?,
                job_timeout,
                lease_timeout,
                recovery_interval: millis(
                    "WORKER_RECOVERY_INTERVAL_MS",
                    defaults.recovery_interval,
                )?,
                storage_cooldown: millis("WORKER_STORAGE_COOLDOWN_MS", defaults.storage_cooldown)?,
                max_storage_cooldown: defaults.max_storage_cooldown,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_queue_config_defaults() {
            temp_env::with_vars(
                [
                    ("QUEUE_KEY_PREFIX", None::<&str>),
                    ("QUEUE_MAX_ATTEMPTS", None),
                    ("QUEUE_BASE_BACKOFF_MS", None),
                    ("QUEUE_MAX_BACKOFF_MS", None),
                ],
                || {
                    let config = QueueConfig::from_env().unwrap();
                    assert_eq!(config.key_prefix, "notifications");
                    assert_eq!(config.retry, RetryPolicy::default());
                },
            );
        }

        #[test]
        fn test_retry_policy_rejects_zero_attempts() {
            temp_env::with_var("QUEUE_MAX_ATTEMPTS", Some("0"), || {
                let err = RetryPolicy::from_env().unwrap_err();
                assert!(err.to_string().contains("QUEUE_MAX_ATTEMPTS"));
            });
        }

        #[test]
        fn test_retry_policy_rejects_cap_below_base() {
            temp_env::with_vars(
                [
                    ("QUEUE_MAX_ATTEMPTS", None::<&str>),
                    ("QUEUE_BASE_BACKOFF_MS", Some("5000")),
                    ("QUEUE_MAX_BACKOFF_MS", Some("1000")),
                ],
                || {
                    assert!(RetryPolicy::from_env().is_err());
                },
            );
        }

        #[test]
        fn test_worker_config_from_env() {
            temp_env::with_vars(
                [
                    ("WORKER_ID", Some("notif-1")),
                    ("WORKER_CONCURRENCY", Some("0")),
                    ("WORKER_POLL_INTERVAL_MS", Some("250")),
                    ("WORKER_JOB_TIMEOUT_MS", None),
                    ("WORKER_LEASE_TIMEOUT_MS", None),
                ],
                || {
                    let config = WorkerConfig::from_env().unwrap();
                    assert_eq!(config.worker_id, "notif-1");
                    assert_eq!(config.concurrency, 1);
                    assert_eq!(config.poll_interval, Duration::from_millis(250));
                    assert_eq!(config.job_timeout, Duration::from_secs(30));
                },
            );
        }

        #[test]
        fn test_worker_config_rejects_lease_shorter_than_job_timeout() {
            temp_env::with_vars(
                [
                    ("WORKER_JOB_TIMEOUT_MS", Some("30000")),
                    ("WORKER_LEASE_TIMEOUT_MS", Some("1000")),
                ],
                || {
                    let err = WorkerConfig::from_env().unwrap_err();
                    assert!(err.to_string().contains("WORKER_LEASE_TIMEOUT_MS"));
                },
            );
            temp_env::with_vars(
                [
                    ("WORKER_JOB_TIMEOUT_MS", Some("30000")),
                    ("WORKER_LEASE_TIMEOUT_MS", Some("35000")),
                ],
                || {
                    let config = WorkerConfig::from_env().unwrap();
                    assert_eq!(config.lease_timeout, Duration::from_secs(35));
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(50, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_policy_requires_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::new()
            .with_worker_id("w-1")
            .with_concurrency(0)
            .with_job_timeout(Duration::from_millis(10));

        assert_eq!(config.worker_id, "w-1");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.job_timeout, Duration::from_millis(10));
        assert!(WorkerConfig::default().worker_id.starts_with("worker-"));
    }

    #[test]
    fn test_effective_lease_outlives_job_timeout() {
        let config = WorkerConfig::new()
            .with_job_timeout(Duration::from_secs(30))
            .with_lease_timeout(Duration::from_secs(1));
        assert_eq!(config.effective_lease_timeout(), Duration::from_secs(35));

        let config = config.with_lease_timeout(Duration::from_secs(300));
        assert_eq!(config.effective_lease_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_storage_cooldown_grows_and_caps() {
        let config = WorkerConfig::new().with_storage_cooldown(Duration::from_secs(1));
        assert_eq!(config.cooldown_for(1), Duration::from_secs(1));
        assert_eq!(config.cooldown_for(3), Duration::from_secs(4));
        assert_eq!(config.cooldown_for(20), Duration::from_secs(30));
    }
}
