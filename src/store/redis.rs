//! Redis-backed key-value store
//!
//! This is the production backend: one Redis instance shared by every
//! authgate process. Single-key commands give the atomicity the limiter and
//! refresh token store rely on.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, Script};

use crate::error::StoreError;

use super::traits::KeyValueStore;

/// INCR that sets the TTL only when the key was just created
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Configuration for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub url: String,
    /// Key prefix for every key written by authgate
    pub prefix: String,
    /// Upper bound for a single command round trip
    pub command_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "authgate:".to_string(),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Redis-based store
///
/// Wraps a `ConnectionManager`, which reconnects transparently; commands
/// issued while the server is unreachable fail and are reported as errors.
pub struct RedisStore {
    config: RedisStoreConfig,
    conn: ConnectionManager,
    increment_script: Script,
}

impl RedisStore {
    /// Connects to Redis using the given configuration
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(map_redis_error)?;

        let conn = tokio::time::timeout(config.command_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(map_redis_error)?;

        tracing::info!(url = %config.url, prefix = %config.prefix, "Connected to Redis");

        Ok(Self {
            config,
            conn,
            increment_script: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Returns the configured Redis URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Returns the key prefix
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        tokio::time::timeout(self.config.command_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let key = make_key(&self.config.prefix, key);
        let mut conn = self.conn.clone();

        let value: Option<Vec<u8>> = self
            .bounded(redis::cmd("GET").arg(&key).query_async(&mut conn))
            .await?;

        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let key = make_key(&self.config.prefix, key);
        let mut conn = self.conn.clone();

        let _: () = self
            .bounded(
                redis::cmd("SET")
                    .arg(&key)
                    .arg(value.as_ref())
                    .arg("EX")
                    .arg(ttl_secs(ttl))
                    .query_async(&mut conn),
            )
            .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = make_key(&self.config.prefix, key);
        let mut conn = self.conn.clone();

        let _: i64 = self
            .bounded(redis::cmd("DEL").arg(&key).query_async(&mut conn))
            .await?;

        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let key = make_key(&self.config.prefix, key);
        let mut conn = self.conn.clone();

        let mut invocation = self.increment_script.key(&key);
        invocation.arg(ttl_secs(ttl));

        let count: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;

        u64::try_from(count)
            .map_err(|_| StoreError::Serialization(format!("negative counter: {count}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();

        let reply: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Connection(format!("unexpected PING reply: {reply}")))
        }
    }
}

/// Generates a prefixed key for Redis storage
fn make_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

/// Redis rejects `EX 0`, so sub-second TTLs round up to one second
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.kind() == ErrorKind::TypeError {
        StoreError::Serialization(err.to_string())
    } else {
        StoreError::Connection(err.to_string())
    }
}
