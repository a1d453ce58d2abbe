//! Container-backed test infrastructure
//!
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDatabase`: PostgreSQL container with automatic cleanup (feature: "postgres")
//!
//! Tests that use these need Docker and are marked `#[ignore]` so the default
//! `cargo test` run stays hermetic.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let conn = redis.connection_manager().await;
//!     // hand conn to the store under test
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;
