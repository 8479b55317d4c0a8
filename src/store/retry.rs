//! Retry wrapper for transient store failures
//!
//! `RetryManager` runs an async operation with exponential backoff and
//! jitter. `RetryingStore` applies it to every call of an inner
//! [`KeyValueStore`], so a single dropped connection does not surface as a
//! 503 to the caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{RetryableError, StoreError};

use super::traits::KeyValueStore;

/// Retry manager with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryManager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation with retry logic
    ///
    /// Retryable errors are retried up to `max_retries` times; the last error
    /// is returned once retries are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.config.max_retries => {
                    warn!(
                        attempts = attempt + 1,
                        max_retries = self.config.max_retries,
                        error = %err,
                        "Store retries exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let backoff = self.calculate_backoff(attempt);
                    debug!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying store operation"
                    );

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff for a given attempt: `initial * multiplier^attempt`, capped at
    /// `max_backoff_ms`, then scaled to 50-100% when jitter is on
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);

        let delay = if self.config.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay / 1000.0)
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Store decorator that retries transient failures of the inner store
///
/// A retried `increment` whose first attempt actually reached the store may
/// count one extra failure. That errs towards locking out, never towards
/// letting an extra guess through.
pub struct RetryingStore<S: KeyValueStore> {
    inner: S,
    retry: RetryManager,
}

impl<S: KeyValueStore> RetryingStore<S> {
    pub fn new(inner: S, retry: RetryManager) -> Self {
        Self { inner, retry }
    }

    /// Returns the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for RetryingStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.retry.execute(|| self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.retry
            .execute(|| self.inner.set(key, value.clone(), ttl))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.retry.execute(|| self.inner.delete(key)).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.retry.execute(|| self.inner.increment(key, ttl)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.retry.execute(|| self.inner.ping()).await
    }
}
