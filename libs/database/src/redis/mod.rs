//! Redis connector used by the job store and the pub/sub relay

mod config;
mod connector;

pub use config::RedisConfig;
pub use connector::{check_health, connect, connect_from_config_with_retry, open_client};

pub use redis::aio::ConnectionManager;
pub use redis::Client;
