#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, env_optional, env_parse};

/// Redis connection settings
///
/// ```ignore
/// use database::redis::RedisConfig;
///
/// let config = RedisConfig::new("redis://127.0.0.1:6379");
/// let config = RedisConfig::from_host("cache.internal", 6380);
/// ```
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Full connection URL, including credentials and database if any
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Build a URL from a bare host and port
    pub fn from_host(host: &str, port: u16) -> Self {
        Self::new(format!("redis://{host}:{port}"))
    }

    /// Select a logical database by appending `/<db>` to the URL
    pub fn with_database(mut self, database: u8) -> Self {
        let base = self.url.trim_end_matches('/');
        self.url = format!("{base}/{database}");
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

/// Environment variables:
/// - `REDIS_URL` - full connection string, takes precedence
/// - `REDIS_HOST` / `REDIS_PORT` (default 6379) - used when no URL is set;
///   a host that already carries a `redis://` scheme is used verbatim
/// - `REDIS_DATABASE` (optional) - logical database number
#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = match env_optional("REDIS_URL") {
            Some(url) => Self::new(url),
            None => {
                let host = env_optional("REDIS_HOST").ok_or_else(|| {
                    ConfigError::MissingEnvVar("REDIS_URL or REDIS_HOST".to_string())
                })?;
                if host.starts_with("redis://") || host.starts_with("rediss://") {
                    Self::new(host)
                } else {
                    Self::from_host(&host, env_parse("REDIS_PORT", 6379u16)?)
                }
            }
        };

        match env_optional("REDIS_DATABASE") {
            Some(_) => Ok(config.with_database(env_parse("REDIS_DATABASE", 0u8)?)),
            None => Ok(config),
        }
    }
}
