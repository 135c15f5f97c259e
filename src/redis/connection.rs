//! Shared Redis connection of the distributed cache
//!
//! Every command of a node goes through one multiplexed connection. A
//! semaphore bounds the commands in flight, each command runs under a
//! timeout, and transport failures are retried with backoff after the
//! connection is re-established.
//!
//! # Example
//!
//! ```rust,no_run
//! use kuba_olap::redis::{RedisConfig, RedisPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::with_url("redis://localhost:6379")
//!     .pool_size(8)
//!     .command_timeout(Duration::from_millis(500));
//!
//! let pool = RedisPool::new(config).await?;
//! let pong: String = pool
//!     .execute("ping", |mut conn| async move {
//!         redis::cmd("PING").query_async(&mut conn).await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::util::{command_error, connection_error};
use crate::error::CacheError;
use crate::metrics;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

/// Connection settings of the distributed cache
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Server URL, `rediss://` when TLS is enabled
    pub url: String,

    /// Commands in flight at once
    pub pool_size: u32,

    /// Bound on establishing the connection
    pub connection_timeout: Duration,

    /// Bound on a single command
    pub command_timeout: Duration,

    /// Attempts after the first failure of a command
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each further attempt
    pub retry_backoff: Duration,

    /// Connect over TLS (needs the `redis-tls` feature)
    pub tls_enabled: bool,

    /// Namespace of every key written by the cache
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            tls_enabled: false,
            key_prefix: "olap".to_string(),
        }
    }
}

impl RedisConfig {
    /// Defaults pointing at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the number of commands in flight
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry budget
    pub fn retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Set the key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Enable or disable TLS
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Check the settings before connecting
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 || self.pool_size > 1000 {
            return Err(format!("pool size must be in 1..=1000, got {}", self.pool_size));
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains(|c: char| c.is_whitespace() || c == ':') {
            return Err(format!(
                "key prefix '{}' must be a non-empty token without whitespace or ':'",
                self.key_prefix
            ));
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err("TLS requested but the 'redis-tls' feature is not compiled".to_string());
        }

        if self.tls_enabled != self.url.starts_with("rediss://") {
            return Err("TLS must be enabled exactly when the URL uses 'rediss://'".to_string());
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-indexed), with up to 25% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff.saturating_mul(1u32 << attempt.min(10));
        let jitter = base.mul_f64(rand::random::<f64>() * 0.25);
        (base + jitter).min(Duration::from_secs(5))
    }
}

/// Multiplexed connection shared by the cache operations of this node
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    permits: Semaphore,
    config: RedisConfig,
}

impl RedisPool {
    /// Validate `config` and open the connection
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        config.validate().map_err(CacheError::Connection)?;
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Connection(connection_error(&config.url, &e)))?;

        let pool = Self {
            client,
            connection: RwLock::new(None),
            permits: Semaphore::new(config.pool_size as usize),
            config,
        };
        pool.connect().await?;
        Ok(pool)
    }

    /// Settings this pool was opened with
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn connect(&self) -> Result<MultiplexedConnection, CacheError> {
        let started = Instant::now();
        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::Connection("timed out connecting to Redis".to_string()))?
        .map_err(|e| CacheError::Connection(connection_error(&self.config.url, &e)))?;

        *self.connection.write().await = Some(conn.clone());
        debug!(elapsed = ?started.elapsed(), "Redis connection established");
        Ok(conn)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.connection.read().await.clone() {
            return Ok(conn);
        }
        self.connect().await
    }

    /// Run the command `op` built by `f`, retrying transport failures
    ///
    /// Protocol errors (wrong type, script errors) are returned at once.
    pub async fn execute<F, Fut, T>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CacheError::Connection("connection pool closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.connection().await?;
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.config.command_timeout, f(conn)).await;
            let elapsed = started.elapsed();

            let failure = match outcome {
                Ok(Ok(value)) => {
                    metrics::record_redis_command(op, "ok", elapsed.as_secs_f64());
                    return Ok(value);
                }
                Ok(Err(e)) if !is_transient(&e) => {
                    metrics::record_redis_command(op, "error", elapsed.as_secs_f64());
                    return Err(command_error(&self.config.url, op, &e));
                }
                Ok(Err(e)) => {
                    if e.is_connection_dropped() || e.is_io_error() {
                        *self.connection.write().await = None;
                    }
                    command_error(&self.config.url, op, &e)
                }
                Err(_) => CacheError::Connection(format!("redis {} timed out after {:?}", op, elapsed)),
            };
            metrics::record_redis_command(op, "error", elapsed.as_secs_f64());

            if attempt >= self.config.max_retries {
                return Err(failure);
            }
            let delay = self.config.backoff(attempt);
            warn!(op, attempt = attempt + 1, ?delay, "Redis command failed, retrying: {}", failure);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_transient(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_io_error()
        || e.is_timeout()
        || matches!(
            e.kind(),
            redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RedisConfig::default();
        assert_eq!(config.key_prefix, "olap");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let bad = [
            RedisConfig::with_url(""),
            RedisConfig::with_url("redis://localhost").pool_size(0),
            RedisConfig::with_url("redis://localhost").pool_size(1001),
            RedisConfig::with_url("redis://localhost").key_prefix("my prefix"),
            RedisConfig::with_url("redis://localhost").key_prefix("olap:eu"),
            RedisConfig::with_url("rediss://localhost:6379").tls(false),
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
        assert!(RedisConfig::with_url("redis://localhost")
            .key_prefix("olap-eu")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_backoff_doubles_with_bounded_jitter() {
        let config = RedisConfig::default().retries(3, Duration::from_millis(100));
        for (attempt, base_ms) in [(0, 100u64), (1, 200), (2, 400)] {
            let delay = config.backoff(attempt);
            assert!(delay >= Duration::from_millis(base_ms), "{:?}", delay);
            assert!(delay <= Duration::from_millis(base_ms * 5 / 4), "{:?}", delay);
        }
        assert_eq!(config.backoff(30), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let result = RedisPool::new(RedisConfig::with_url("redis://localhost").pool_size(0)).await;
        assert!(matches!(result, Err(CacheError::Connection(_))));
    }
}
