//! Job record and its state machine.
//!
//! Transitions live here so the in-memory and Redis stores apply exactly the
//! same rules; the stores only differ in how they persist the result.

use crate::config::RetryPolicy;
use crate::kind::JobKind;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Time-ordered job identifier (UUID v7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum JobState {
    Pending,
    Delayed,
    Running,
    Succeeded,
    Failed,
    Abandoned,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Abandoned
        )
    }

    /// Waiting in the queue index (PENDING or DELAYED)
    pub fn is_queued(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Delayed)
    }
}

/// Claim token handed to the worker that runs an attempt.
///
/// `complete`/`fail` only apply while the stored job is still RUNNING with the
/// same attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub attempt: u32,
}

/// Request to enqueue a job
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub kind: String,
    pub payload: Value,
    pub not_before: DateTime<Utc>,
}

impl NewJob {
    pub fn new<K: JobKind>(kind: K, payload: Value, not_before: DateTime<Utc>) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
            not_before,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Persisted kind name, parsed by the worker at dispatch time
    pub kind: String,
    pub payload: Value,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub not_before: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh record; DELAYED when `not_before` is still in the future
    pub fn new(id: JobId, new_job: NewJob, max_attempts: u32, now: DateTime<Utc>) -> Self {
        let state = if new_job.not_before > now {
            JobState::Delayed
        } else {
            JobState::Pending
        };

        Self {
            id,
            kind: new_job.kind,
            payload: new_job.payload,
            state,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            not_before: new_job.not_before,
            last_error: None,
            created_at: now,
            updated_at: now,
            claimed_by: None,
            claimed_at: None,
        }
    }

    pub fn lease(&self) -> Lease {
        Lease {
            job_id: self.id,
            attempt: self.attempts,
        }
    }

    /// True while `lease` is the live claim on this job
    pub fn holds(&self, lease: &Lease) -> bool {
        self.id == lease.job_id && self.state == JobState::Running && self.attempts == lease.attempt
    }

    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.state.is_queued() && self.not_before <= now
    }

    /// Parse the persisted kind into `K`
    pub fn kind_as<K: JobKind>(&self) -> Option<K> {
        self.kind.parse().ok()
    }

    /// Decode the payload into a typed struct
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    pub(crate) fn mark_claimed(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.state = JobState::Running;
        self.attempts += 1;
        self.claimed_by = Some(worker_id.to_string());
        self.claimed_at = Some(now);
        self.updated_at = now;
    }

    pub(crate) fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Succeeded;
        self.updated_at = now;
    }

    /// Retryable failure: back to PENDING with backoff, or ABANDONED at the bound
    pub(crate) fn mark_failed_attempt(
        &mut self,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) {
        self.last_error = Some(error.to_string());
        self.updated_at = now;

        if self.attempts >= self.max_attempts {
            self.state = JobState::Abandoned;
        } else {
            let delay = TimeDelta::from_std(policy.backoff(self.attempts)).unwrap_or(TimeDelta::MAX);
            self.state = JobState::Pending;
            self.not_before = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
    }

    pub(crate) fn mark_abandoned(&mut self, reason: &str, now: DateTime<Utc>) {
        self.state = JobState::Abandoned;
        self.last_error = Some(reason.to_string());
        self.updated_at = now;
    }

    /// Permanent failure: FAILED without further attempts
    pub(crate) fn mark_discarded(&mut self, reason: &str, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.last_error = Some(reason.to_string());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(60))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn job_due_at(not_before: DateTime<Utc>) -> Job {
        let new_job = NewJob {
            kind: "EVENT_REMINDER".into(),
            payload: json!({"user_id": 7}),
            not_before,
        };
        Job::new(JobId::new(), new_job, 3, now())
    }

    #[test]
    fn test_new_job_state_depends_on_not_before() {
        assert_eq!(job_due_at(now()).state, JobState::Pending);
        assert_eq!(
            job_due_at(now() + TimeDelta::seconds(1)).state,
            JobState::Delayed
        );
        assert_eq!(
            job_due_at(now() - TimeDelta::seconds(1)).state,
            JobState::Pending
        );
    }

    #[test]
    fn test_claim_increments_attempts_and_issues_lease() {
        let mut job = job_due_at(now());
        job.mark_claimed("worker-1", now());

        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.claimed_by.as_deref(), Some("worker-1"));

        let lease = job.lease();
        assert!(job.holds(&lease));

        job.mark_succeeded(now());
        assert!(!job.holds(&lease));
    }

    #[test]
    fn test_failed_attempt_backs_off_exponentially() {
        let mut job = job_due_at(now());

        job.mark_claimed("w", now());
        job.mark_failed_attempt("boom", &policy(), now());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.not_before, now() + TimeDelta::seconds(1));

        job.mark_claimed("w", now());
        job.mark_failed_attempt("boom", &policy(), now());
        assert_eq!(job.not_before, now() + TimeDelta::seconds(2));
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failed_attempt_at_bound_abandons() {
        let mut job = job_due_at(now());
        for _ in 0..3 {
            job.mark_claimed("w", now());
            job.mark_failed_attempt("smtp refused", &policy(), now());
        }

        assert_eq!(job.state, JobState::Abandoned);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.last_error.as_deref(), Some("smtp refused"));
    }

    #[test]
    fn test_discard_marks_failed() {
        let mut job = job_due_at(now());
        job.mark_claimed("w", now());
        job.mark_discarded("undecodable payload", now());
        assert_eq!(job.state, JobState::Failed);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_state_string_forms() {
        assert_eq!(JobState::Abandoned.to_string(), "ABANDONED");
        assert_eq!("delayed".parse::<JobState>().unwrap(), JobState::Delayed);
        assert_eq!(
            serde_json::to_value(JobState::Running).unwrap(),
            json!("RUNNING")
        );
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = job_due_at(now());
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("notBefore").is_some());
        assert!(value.get("maxAttempts").is_some());
        assert_eq!(value["state"], "PENDING");
    }

    #[test]
    fn test_job_id_round_trips_through_string() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
