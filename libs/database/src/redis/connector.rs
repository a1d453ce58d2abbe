use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::RedisConfig;
use crate::common::{DatabaseError, RetryConfig, retry_with_backoff};

/// Open a client without connecting (pub/sub subscribers need the client)
pub fn open_client(config: &RedisConfig) -> redis::RedisResult<Client> {
    Client::open(config.url())
}

/// Connect and verify the connection with PING
///
/// The returned `ConnectionManager` reconnects on its own after transient
/// failures, so one instance is cloned into every component.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    debug!("Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect from config, retrying with backoff on failure
pub async fn connect_from_config_with_retry(
    config: RedisConfig,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    let url = config.url;
    retry_with_backoff(|| connect(&url), retry_config.unwrap_or_default()).await
}

/// PING the server; the worker refuses to start without a PONG
pub async fn check_health(conn: &mut ConnectionManager) -> Result<(), DatabaseError> {
    let response: String = redis::cmd("PING").query_async(conn).await?;

    if response != "PONG" {
        return Err(DatabaseError::HealthCheckFailed(format!(
            "Redis PING returned unexpected response: {response}"
        )));
    }

    Ok(())
}
