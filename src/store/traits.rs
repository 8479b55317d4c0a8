//! Key-value store trait
//!
//! This module defines the KeyValueStore trait that the attempt limiter and
//! the refresh token store are built on. Implementations only need
//! single-key atomicity; nothing in authgate requires multi-key transactions.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

/// Trait for shared key-value stores
///
/// Every method is a potentially suspending round trip. A failure must be
/// reported as an error and never as an absent key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the name of this store backend
    fn name(&self) -> &str;

    /// Retrieves the value stored under `key`
    ///
    /// Returns `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value and TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Deletes `key`
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically increments the integer counter under `key` and returns the
    /// new value
    ///
    /// When the increment creates the key, its TTL is set to `ttl`. An
    /// existing key keeps its remaining TTL.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Round-trip liveness check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Decodes a counter value written by [`KeyValueStore::increment`]
pub fn decode_counter(value: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            StoreError::Serialization(format!(
                "counter is not an integer: {:?}",
                String::from_utf8_lossy(value)
            ))
        })
}

/// Key written by [`round_trip`]
pub const PROBE_KEY: &str = "health:probe";

/// Writes a probe value and reads it back
///
/// Used at startup and by the store health endpoint.
pub async fn round_trip(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store
        .set(PROBE_KEY, Bytes::from_static(b"pong"), Duration::from_secs(10))
        .await?;

    match store.get(PROBE_KEY).await? {
        Some(value) if value.as_ref() == b"pong" => Ok(()),
        Some(other) => Err(StoreError::Serialization(format!(
            "probe read back {:?}",
            String::from_utf8_lossy(&other)
        ))),
        None => Err(StoreError::Connection("probe key not readable".to_string())),
    }
}
