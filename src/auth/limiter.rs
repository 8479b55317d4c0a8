//! Failed-login attempt limiter
//!
//! Counts login attempts per email in the shared key-value store. An
//! attempt is reserved before the credentials are checked and the counter is
//! cleared on success, so it holds the failures of the current window. The
//! window is fixed from the first failure: the counter key gets its TTL when
//! it is created and later increments leave it alone, so every update is a
//! single atomic store operation.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::AuthError;
use crate::store::{decode_counter, KeyValueStore};

/// Store key prefix for attempt counters
const KEY_PREFIX: &str = "login_attempts:";

/// Configuration for the attempt limiter
#[derive(Debug, Clone)]
pub struct AttemptLimitConfig {
    /// Failed attempts allowed within one window
    pub max_attempts: u32,

    /// Window length, counted from the first failure
    pub window: Duration,
}

impl Default for AttemptLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-identity failed attempt limiter
pub struct AttemptLimiter {
    store: Arc<dyn KeyValueStore>,
    config: AttemptLimitConfig,
}

impl AttemptLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: AttemptLimitConfig) -> Self {
        Self { store, config }
    }

    /// Create a limiter with default configuration
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, AttemptLimitConfig::default())
    }

    pub fn config(&self) -> &AttemptLimitConfig {
        &self.config
    }

    /// Current failure count for `identity` (0 when absent or expired)
    pub async fn attempts(&self, identity: &str) -> Result<u64, AuthError> {
        match self.store.get(&counter_key(identity)).await? {
            Some(value) => Ok(decode_counter(&value)?),
            None => Ok(0),
        }
    }

    /// Fails with `RateLimited` when `identity` already has `max_attempts`
    /// failures in the current window
    pub async fn check(&self, identity: &str) -> Result<(), AuthError> {
        let attempts = self.attempts(identity).await?;

        if attempts >= u64::from(self.config.max_attempts) {
            warn!(
                identity = %identity,
                attempts,
                max_attempts = self.config.max_attempts,
                "Login rate limited"
            );
            return Err(AuthError::RateLimited);
        }

        Ok(())
    }

    /// Records one failed attempt and returns the new count
    pub async fn record_failure(&self, identity: &str) -> Result<u64, AuthError> {
        let count = self
            .store
            .increment(&counter_key(identity), self.config.window)
            .await?;
        Ok(count)
    }

    /// Reserves one attempt for `identity` before its credentials are checked
    ///
    /// The counter is incremented atomically first, so concurrent callers can
    /// never get more than `max_attempts` attempts through in one window.
    /// Fails with `RateLimited` once the new count exceeds `max_attempts`.
    pub async fn reserve(&self, identity: &str) -> Result<u64, AuthError> {
        let count = self.record_failure(identity).await?;

        if count > u64::from(self.config.max_attempts) {
            warn!(
                identity = %identity,
                attempts = count,
                max_attempts = self.config.max_attempts,
                "Login rate limited"
            );
            return Err(AuthError::RateLimited);
        }

        Ok(count)
    }

    /// Clears the counter for `identity`; a no-op when absent
    pub async fn reset(&self, identity: &str) -> Result<(), AuthError> {
        self.store.delete(&counter_key(identity)).await?;
        Ok(())
    }
}

fn counter_key(identity: &str) -> String {
    format!("{}{}", KEY_PREFIX, identity)
}
