//! Connection helpers for the stores the notification services talk to.
//!
//! # Features
//!
//! - `redis` (default) - Redis `ConnectionManager` for the job queue and relay
//! - `postgres` (default) - SeaORM connection for subscription lookups
//! - `config` - `core_config::FromEnv` implementations for the configs
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::redis::{RedisConfig, connect_from_config_with_retry};
//!
//! let config = RedisConfig::from_env()?;
//! let redis = connect_from_config_with_retry(config, None).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult, RetryConfig};
