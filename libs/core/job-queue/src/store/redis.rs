//! Redis-backed job store.
//!
//! Layout under a configurable prefix `{p}`:
//! - `{p}:job:{id}`: hash holding the job record, times in epoch milliseconds
//! - `{p}:queue`: sorted set of queued job ids scored by `not_before`
//! - `{p}:running`: sorted set of claimed job ids scored by `claimed_at`
//! - `{p}:terminal:{STATE}`: sorted set of finished job ids scored by finish time
//!
//! Claim and every RUNNING transition are Lua scripts, so two workers can never
//! hold the same attempt and a stale lease cannot overwrite a newer one.

use super::{JobStats, JobStore};
use crate::clock::{Clock, from_millis};
use crate::config::RetryPolicy;
use crate::error::{StoreError, StoreResult};
use crate::job::{Job, JobId, JobState, Lease, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pop the earliest due id, mark it RUNNING and return it with the updated
/// hash. Entries whose job is gone or no longer queued are dropped on the way.
const CLAIM_SCRIPT: &str = r#"
while true do
  local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
  if #ids == 0 then
    return false
  end
  local id = ids[1]
  redis.call('ZREM', KEYS[1], id)
  local key = ARGV[3] .. id
  local state = redis.call('HGET', key, 'state')
  if state == 'PENDING' or state == 'DELAYED' then
    redis.call('HINCRBY', key, 'attempts', 1)
    redis.call('HSET', key, 'state', 'RUNNING', 'claimed_by', ARGV[2], 'claimed_at', ARGV[1], 'updated_at', ARGV[1])
    redis.call('ZADD', KEYS[2], ARGV[1], id)
    return {id, redis.call('HGETALL', key)}
  end
end
"#;

/// Apply a transition computed client-side, only if the lease still matches.
const COMMIT_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'RUNNING' then
  return 0
end
if redis.call('HGET', KEYS[1], 'attempts') ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 4))
redis.call('ZREM', KEYS[2], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[2])
return 1
"#;

/// Park an undecodable job in the ABANDONED set so no sweep trips over it again.
const QUARANTINE_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('HSET', KEYS[1], 'state', 'ABANDONED', 'last_error', ARGV[3], 'updated_at', ARGV[2])
end
redis.call('ZADD', KEYS[4], ARGV[2], ARGV[1])
return 1
"#;

const CANCEL_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if state ~= 'PENDING' and state ~= 'DELAYED' then
  return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[1])
return 1
"#;

/// Key names for one queue
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn job(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    pub fn running(&self) -> String {
        format!("{}:running", self.prefix)
    }

    pub fn terminal(&self, state: JobState) -> String {
        format!("{}:terminal:{}", self.prefix, state)
    }
}

pub struct RedisJobStore {
    redis: ConnectionManager,
    keys: RedisKeys,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    claim_script: Script,
    commit_script: Script,
    cancel_script: Script,
    quarantine_script: Script,
}

/// What a fetched job hash turned out to hold
#[derive(Debug)]
enum Fetched {
    Job(Job),
    Missing,
    Corrupt(String),
}

/// Split a decode result so a corrupt record can be set aside instead of
/// failing the caller; connection errors still propagate.
fn triage(decoded: StoreResult<Option<Job>>) -> StoreResult<Fetched> {
    match decoded {
        Ok(Some(job)) => Ok(Fetched::Job(job)),
        Ok(None) => Ok(Fetched::Missing),
        Err(StoreError::Corrupt { details, .. }) => Ok(Fetched::Corrupt(details)),
        Err(e) => Err(e),
    }
}

impl RedisJobStore {
    pub fn new(
        redis: ConnectionManager,
        key_prefix: impl Into<String>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            redis,
            keys: RedisKeys::new(key_prefix),
            retry,
            clock,
            claim_script: Script::new(CLAIM_SCRIPT),
            commit_script: Script::new(COMMIT_SCRIPT),
            cancel_script: Script::new(CANCEL_SCRIPT),
            quarantine_script: Script::new(QUARANTINE_SCRIPT),
        }
    }

    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Write `job` if the stored record is still RUNNING at `expected_attempt`
    async fn commit(&self, expected_attempt: u32, job: &Job) -> StoreResult<bool> {
        let id = job.id.to_string();
        let (target, score) = if job.state.is_queued() {
            (self.keys.queue(), job.not_before.timestamp_millis())
        } else {
            (self.keys.terminal(job.state), job.updated_at.timestamp_millis())
        };

        let mut invocation = self.commit_script.prepare_invoke();
        invocation
            .key(self.keys.job(&job.id))
            .key(self.keys.running())
            .key(target)
            .arg(expected_attempt)
            .arg(&id)
            .arg(score);
        for (field, value) in encode(job)? {
            invocation.arg(field).arg(value);
        }

        let mut conn = self.redis.clone();
        let applied: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(applied == 1)
    }

    async fn resolve<F>(&self, lease: Lease, transition: F) -> StoreResult<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>) + Send,
    {
        let lost = || StoreError::LeaseLost {
            job_id: lease.job_id,
            attempt: lease.attempt,
        };

        let mut job = self
            .get(lease.job_id)
            .await?
            .ok_or(StoreError::NotFound(lease.job_id))?;
        if !job.holds(&lease) {
            return Err(lost());
        }

        transition(&mut job, self.clock.now());
        if self.commit(lease.attempt, &job).await? {
            Ok(job)
        } else {
            Err(lost())
        }
    }

    /// Move `raw_id` out of the queue and running sets into ABANDONED
    async fn quarantine(&self, raw_id: &str, details: &str) -> StoreResult<()> {
        warn!(job_id = %raw_id, details, "Abandoning corrupt job record");
        let mut conn = self.redis.clone();
        let _: i64 = self
            .quarantine_script
            .key(format!("{}{}", self.keys.job_prefix(), raw_id))
            .key(self.keys.queue())
            .key(self.keys.running())
            .key(self.keys.terminal(JobState::Abandoned))
            .arg(raw_id)
            .arg(self.clock.now().timestamp_millis())
            .arg(format!("corrupt job record: {details}"))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn fetch_many(&self, ids: Vec<String>) -> StoreResult<Vec<Job>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(format!("{}{}", self.keys.job_prefix(), id));
        }

        let mut conn = self.redis.clone();
        let records: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut jobs = Vec::with_capacity(records.len());
        for fields in records {
            if let Some(job) = decode(&fields)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, new_job: NewJob) -> StoreResult<JobId> {
        let job = Job::new(JobId::new(), new_job, self.retry.max_attempts, self.clock.now());
        let fields = encode(&job)?;

        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(self.keys.job(&job.id), &fields)
            .ignore()
            .zadd(
                self.keys.queue(),
                job.id.to_string(),
                job.not_before.timestamp_millis(),
            )
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %job.id, kind = %job.kind, state = %job.state, "Enqueued job");
        Ok(job.id)
    }

    async fn claim_next(&self, worker_id: &str) -> StoreResult<Option<Job>> {
        let now = self.clock.now().timestamp_millis();
        let mut conn = self.redis.clone();

        loop {
            let claimed: Option<(String, HashMap<String, String>)> = self
                .claim_script
                .key(self.keys.queue())
                .key(self.keys.running())
                .arg(now)
                .arg(worker_id)
                .arg(self.keys.job_prefix())
                .invoke_async(&mut conn)
                .await?;

            let Some((raw_id, fields)) = claimed else {
                return Ok(None);
            };
            match triage(decode(&fields))? {
                Fetched::Job(job) => return Ok(Some(job)),
                Fetched::Missing => continue,
                Fetched::Corrupt(details) => self.quarantine(&raw_id, &details).await?,
            }
        }
    }

    async fn complete(&self, lease: Lease) -> StoreResult<Job> {
        self.resolve(lease, |job, now| job.mark_succeeded(now)).await
    }

    async fn fail(&self, lease: Lease, error: &str) -> StoreResult<Job> {
        let retry = self.retry.clone();
        self.resolve(lease, move |job, now| {
            job.mark_failed_attempt(error, &retry, now)
        })
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
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(self.keys.running(), "-inf", older_than.timestamp_millis())
            .await?;

        let mut recovered = Vec::new();
        for raw_id in ids {
            let Ok(id) = JobId::from_str(&raw_id) else {
                warn!(job_id = %raw_id, "Removing malformed id from running set");
                let _: () = conn.zrem(self.keys.running(), &raw_id).await?;
                continue;
            };

            let mut job = match triage(self.get(id).await)? {
                Fetched::Job(job) => job,
                Fetched::Missing => {
                    let _: () = conn.zrem(self.keys.running(), &raw_id).await?;
                    continue;
                }
                Fetched::Corrupt(details) => {
                    self.quarantine(&raw_id, &details).await?;
                    continue;
                }
            };

            let orphaned = job.state == JobState::Running
                && job.claimed_at.is_some_and(|claimed| claimed <= older_than);
            if !orphaned {
                continue;
            }

            let lease = job.lease();
            let reason = format!(
                "lease expired: {} stopped responding",
                job.claimed_by.as_deref().unwrap_or("unknown worker")
            );
            job.mark_failed_attempt(&reason, &self.retry, self.clock.now());

            if self.commit(lease.attempt, &job).await? {
                recovered.push(job);
            }
        }

        Ok(recovered)
    }

    async fn cancel(&self, id: JobId) -> StoreResult<bool> {
        let mut conn = self.redis.clone();
        let removed: i64 = self
            .cancel_script
            .key(self.keys.job(&id))
            .key(self.keys.queue())
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.keys.job(&id)).await?;
        decode(&fields)
    }

    async fn list(&self, state: JobState, limit: usize) -> StoreResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now().timestamp_millis();
        let count = isize::try_from(limit).unwrap_or(isize::MAX);
        let mut conn = self.redis.clone();

        let ids: Vec<String> = match state {
            JobState::Pending => {
                conn.zrangebyscore_limit(self.keys.queue(), "-inf", now, 0, count)
                    .await?
            }
            JobState::Delayed => {
                conn.zrangebyscore_limit(self.keys.queue(), format!("({now}"), "+inf", 0, count)
                    .await?
            }
            JobState::Running => conn.zrange(self.keys.running(), 0, count - 1).await?,
            terminal => {
                conn.zrevrange(self.keys.terminal(terminal), 0, count - 1)
                    .await?
            }
        };

        self.fetch_many(ids).await
    }

    async fn stats(&self) -> StoreResult<JobStats> {
        let now = self.clock.now().timestamp_millis();
        let mut conn = self.redis.clone();

        let (pending, delayed, running, succeeded, failed, abandoned): (
            u64,
            u64,
            u64,
            u64,
            u64,
            u64,
        ) = redis::pipe()
            .zcount(self.keys.queue(), "-inf", now)
            .zcount(self.keys.queue(), format!("({now}"), "+inf")
            .zcard(self.keys.running())
            .zcard(self.keys.terminal(JobState::Succeeded))
            .zcard(self.keys.terminal(JobState::Failed))
            .zcard(self.keys.terminal(JobState::Abandoned))
            .query_async(&mut conn)
            .await?;

        Ok(JobStats {
            pending,
            delayed,
            running,
            succeeded,
            failed,
            abandoned,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn encode(job: &Job) -> StoreResult<Vec<(&'static str, String)>> {
    let millis = |at: Option<DateTime<Utc>>| {
        at.map(|at| at.timestamp_millis().to_string())
            .unwrap_or_default()
    };

    Ok(vec![
        ("id", job.id.to_string()),
        ("kind", job.kind.clone()),
        ("payload", serde_json::to_string(&job.payload)?),
        ("state", job.state.to_string()),
        ("attempts", job.attempts.to_string()),
        ("max_attempts", job.max_attempts.to_string()),
        ("not_before", job.not_before.timestamp_millis().to_string()),
        ("last_error", job.last_error.clone().unwrap_or_default()),
        ("created_at", job.created_at.timestamp_millis().to_string()),
        ("updated_at", job.updated_at.timestamp_millis().to_string()),
        ("claimed_by", job.claimed_by.clone().unwrap_or_default()),
        ("claimed_at", millis(job.claimed_at)),
    ])
}

/// Decode a job hash; an empty hash means the key does not exist
fn decode(fields: &HashMap<String, String>) -> StoreResult<Option<Job>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let record = Record {
        id: fields.get("id").map(String::as_str).unwrap_or("<missing>"),
        fields,
    };

    Ok(Some(Job {
        id: record.parse("id")?,
        kind: record.required("kind")?.to_string(),
        payload: serde_json::from_str(record.required("payload")?)
            .map_err(|e| record.corrupt(format!("payload: {e}")))?,
        state: record.parse("state")?,
        attempts: record.parse("attempts")?,
        max_attempts: record.parse("max_attempts")?,
        not_before: record.millis("not_before")?,
        last_error: record.optional("last_error").map(str::to_string),
        created_at: record.millis("created_at")?,
        updated_at: record.millis("updated_at")?,
        claimed_by: record.optional("claimed_by").map(str::to_string),
        claimed_at: match record.optional("claimed_at") {
            Some(_) => Some(record.millis("claimed_at")?),
            None => None,
        },
    }))
}

struct Record<'a> {
    id: &'a str,
    fields: &'a HashMap<String, String>,
}

impl<'a> Record<'a> {
    fn corrupt(&self, details: String) -> StoreError {
        StoreError::Corrupt {
            id: self.id.to_string(),
            details,
        }
    }

    fn optional(&self, name: &str) -> Option<&'a str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> StoreResult<&'a str> {
        self.optional(name)
            .ok_or_else(|| self.corrupt(format!("missing field '{name}'")))
    }

    fn parse<T>(&self, name: &str) -> StoreResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.required(name)?
            .parse()
            .map_err(|e: T::Err| self.corrupt(format!("{name}: {e}")))
    }

    fn millis(&self, name: &str) -> StoreResult<DateTime<Utc>> {
        self.parse::<i64>(name).map(from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeDelta;
    use serde_json::json;
    use std::time::Duration;
    use test_utils::TestRedis;

    fn sample_job() -> Job {
        let now = from_millis(1_700_000_000_000);
        let mut job = Job::new(
            JobId::new(),
            NewJob {
                kind: "NEW_EVENT".into(),
                payload: json!({"event": {"id": 1, "title": "Jazz Night"}}),
                not_before: now,
            },
            3,
            now,
        );
        job.mark_claimed("worker-a", now);
        job
    }

    #[test]
    fn test_keys_layout() {
        let keys = RedisKeys::new("notifications");
        let id = JobId::new();
        assert_eq!(keys.job(&id), format!("notifications:job:{id}"));
        assert_eq!(keys.queue(), "notifications:queue");
        assert_eq!(keys.running(), "notifications:running");
        assert_eq!(
            keys.terminal(JobState::Abandoned),
            "notifications:terminal:ABANDONED"
        );
    }

    #[test]
    fn test_encode_decode_preserves_job() {
        let job = sample_job();
        let fields: HashMap<String, String> = encode(&job)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(fields["state"], "RUNNING");
        assert_eq!(fields["last_error"], "");
        assert_eq!(decode(&fields).unwrap(), Some(job));
    }

    #[test]
    fn test_decode_empty_hash_is_missing() {
        assert_eq!(decode(&HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_decode_reports_corrupt_field() {
        let job = sample_job();
        let mut fields: HashMap<String, String> = encode(&job)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        fields.insert("attempts".into(), "many".into());

        let err = decode(&fields).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.to_string().contains("attempts"));
    }

    #[test]
    fn test_triage_sets_corrupt_records_aside() {
        let mut fields: HashMap<String, String> = encode(&sample_job())
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        fields.insert("attempts".into(), "many".into());

        match triage(decode(&fields)).unwrap() {
            Fetched::Corrupt(details) => assert!(details.contains("attempts")),
            other => panic!("expected a corrupt record, got {other:?}"),
        }
        assert!(matches!(triage(decode(&HashMap::new())).unwrap(), Fetched::Missing));
        assert!(matches!(
            triage(Err(StoreError::Unavailable("connection refused".into()))),
            Err(StoreError::Unavailable(_))
        ));
    }

    async fn redis_store(redis: &TestRedis, clock: &ManualClock) -> RedisJobStore {
        let client = redis::Client::open(redis.connection_string()).unwrap();
        let conn = ConnectionManager::new(client).await.unwrap();
        RedisJobStore::new(
            conn,
            format!("test:{}", JobId::new()),
            RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(60)),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_retry_cycle() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = redis_store(&redis, &clock).await;

        let id = store
            .enqueue(NewJob {
                kind: "EVENT_REMINDER".into(),
                payload: json!({"user_id": 7}),
                not_before: clock.now() + TimeDelta::hours(24),
            })
            .await
            .unwrap();
        assert!(store.claim_next("w").await.unwrap().is_none());

        clock.advance(TimeDelta::hours(24));
        let job = store.claim_next("w").await.unwrap().unwrap();
        assert_eq!((job.id, job.attempts), (id, 1));

        let job = store.fail(job.lease(), "timeout").await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(store.stats().await.unwrap().delayed, 1);

        clock.advance(TimeDelta::seconds(1));
        let job = store.claim_next("w").await.unwrap().unwrap();
        let job = store.complete(job.lease()).await.unwrap();
        assert_eq!((job.state, job.attempts), (JobState::Succeeded, 2));

        let finished = store.list(JobState::Succeeded, 10).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(store.stats().await.unwrap().succeeded, 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_concurrent_claims_are_unique() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = Arc::new(redis_store(&redis, &clock).await);

        for _ in 0..20 {
            store
                .enqueue(NewJob {
                    kind: "NEW_EVENT".into(),
                    payload: json!({}),
                    not_before: clock.now(),
                })
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(job) = store.claim_next(&format!("w{worker}")).await.unwrap() {
                    ids.push(job.id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_recovery_rejects_old_lease() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = redis_store(&redis, &clock).await;

        store
            .enqueue(NewJob {
                kind: "NEW_EVENT".into(),
                payload: json!({}),
                not_before: clock.now(),
            })
            .await
            .unwrap();
        let first = store.claim_next("crashed").await.unwrap().unwrap();

        clock.advance(TimeDelta::minutes(10));
        let recovered = store
            .recover_stale(clock.now() - TimeDelta::minutes(5))
            .await
            .unwrap();
        assert_eq!(recovered.len(), 1);

        clock.advance(TimeDelta::seconds(1));
        let second = store.claim_next("healthy").await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);
        assert!(store.complete(first.lease()).await.unwrap_err().is_lease_lost());
        assert!(store.complete(second.lease()).await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_recovery_skips_corrupt_record() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = redis_store(&redis, &clock).await;

        for _ in 0..2 {
            store
                .enqueue(NewJob {
                    kind: "NEW_EVENT".into(),
                    payload: json!({}),
                    not_before: clock.now(),
                })
                .await
                .unwrap();
        }
        let broken = store.claim_next("crashed").await.unwrap().unwrap();
        let healthy = store.claim_next("crashed").await.unwrap().unwrap();

        let mut conn = redis.connection_manager().await;
        let _: () = conn
            .hset(store.keys().job(&broken.id), "attempts", "many")
            .await
            .unwrap();

        clock.advance(TimeDelta::minutes(10));
        let recovered = store
            .recover_stale(clock.now() - TimeDelta::minutes(5))
            .await
            .unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, healthy.id);

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.running, stats.abandoned), (0, 1));
        assert!(store.recover_stale(clock.now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_claim_skips_corrupt_record() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = redis_store(&redis, &clock).await;

        let mut ids = Vec::new();
        for offset in [2, 1] {
            ids.push(
                store
                    .enqueue(NewJob {
                        kind: "NEW_EVENT".into(),
                        payload: json!({}),
                        not_before: clock.now() - TimeDelta::seconds(offset),
                    })
                    .await
                    .unwrap(),
            );
        }
        let mut conn = redis.connection_manager().await;
        let _: () = conn
            .hset(store.keys().job(&ids[0]), "payload", "{not json")
            .await
            .unwrap();

        let claimed = store.claim_next("w").await.unwrap().unwrap();
        assert_eq!(claimed.id, ids[1]);
        let stats = store.stats().await.unwrap();
        assert_eq!((stats.running, stats.abandoned), (1, 1));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_store_cancel() {
        let redis = TestRedis::new().await;
        let clock = ManualClock::starting_now();
        let store = redis_store(&redis, &clock).await;

        let id = store
            .enqueue(NewJob {
                kind: "EVENT_REMINDER".into(),
                payload: json!({}),
                not_before: clock.now() + TimeDelta::hours(1),
            })
            .await
            .unwrap();

        assert!(store.cancel(id).await.unwrap());
        assert!(!store.cancel(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.ping().await.is_ok());
    }
}
