//! Job Queue
//!
//! A durable delayed-job queue with an explicit retry state machine.
//!
//! ## Features
//!
//! - **Job store**: Redis (Lua-scripted atomic claim) or in-memory
//! - **Delayed jobs**: nothing is claimed before its `not_before`
//! - **Retries**: exponential backoff, ABANDONED once attempts run out
//! - **Crash recovery**: claims older than the lease timeout are requeued
//! - **Worker pool**: bounded concurrency, per-job timeout, graceful drain
//! - **Pub/sub relay**: best-effort fan-out next to the durable job
//! - **Admin endpoints**: health, readiness, Prometheus metrics, job inspection
//!
//! ## Example
//!
//! ```ignore
//! use job_queue::{HandlerRegistry, JobProducer, RedisJobStore, SystemClock, Worker, WorkerConfig};
//!
//! let store = Arc::new(RedisJobStore::new(redis, "notifications", retry, Arc::new(SystemClock)));
//! let producer = JobProducer::<MyKind>::new(store.clone(), Arc::new(SystemClock));
//! producer.enqueue(MyKind::Reminder, payload, TimeDelta::hours(24)).await?;
//!
//! let registry = HandlerRegistry::new().register(MyKind::Reminder, ReminderHandler::new(..));
//! let worker = Worker::new(store, registry, Arc::new(SystemClock), WorkerConfig::default());
//! worker.run(shutdown_rx).await?;
//! ```

mod clock;
mod config;
mod error;
mod health;
mod job;
mod kind;
pub mod metrics;
mod producer;
mod registry;
pub mod relay;
pub mod store;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LEASE_MARGIN, QueueConfig, RetryPolicy, WorkerConfig};
pub use error::{HandlerError, QueueError, RelayError, StoreError, StoreResult};
pub use health::{AdminState, HealthResponse, admin_router};
pub use job::{Job, JobId, JobState, Lease, NewJob};
pub use kind::JobKind;
pub use metrics::init_metrics;
pub use producer::JobProducer;
pub use registry::{HandlerRegistry, JobHandler};
pub use relay::{ChannelMessage, LocalRelay, PubSubRelay, RedisRelay, Subscription};
pub use store::{JobStats, JobStore, MemoryJobStore, RedisJobStore};
pub use worker::Worker;
