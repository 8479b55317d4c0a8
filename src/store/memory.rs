//! In-process key-value store
//!
//! Keeps entries in a map guarded by a single async lock, so every
//! operation, including increment-with-TTL, is atomic with respect to other
//! callers of the same instance. Suitable for tests and single-instance
//! deployments; multiple instances need the Redis backend.
//!
//! Expired entries are dropped when read, and writes sweep the whole map at
//! most once a minute of clock time, so keys that are never
//! read again do not accumulate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

use super::traits::{decode_counter, KeyValueStore};

/// Minimum clock time between two sweeps of expired entries
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: DateTime<Utc>,
}

/// In-memory store with clock-driven expiry
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    /// Clock time of the last sweep, unix millis
    last_sweep: AtomicI64,
}

impl MemoryStore {
    /// Creates an empty store using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that evaluates TTLs against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let last_sweep = AtomicI64::new(clock.now().timestamp_millis());
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            last_sweep,
        }
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Returns true if there are no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of `key`, if present
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| (e.expires_at - now).to_std().ok())
    }

    /// Drops every expired entry if the last sweep is older than
    /// `SWEEP_INTERVAL`; callers hold the write lock
    fn sweep_expired(&self, entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
        let now_millis = now.timestamp_millis();
        let interval = SWEEP_INTERVAL.as_millis() as i64;

        if now_millis.saturating_sub(self.last_sweep.load(Ordering::Relaxed)) < interval {
            return;
        }
        self.last_sweep.store(now_millis, Ordering::Relaxed);

        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);

        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Swept expired entries");
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.write().await;

        self.sweep_expired(&mut entries, now);
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        self.sweep_expired(&mut entries, now);

        let current = match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                Some((decode_counter(&entry.value)?, entry.expires_at))
            }
            _ => None,
        };

        let (count, expires_at) = match current {
            Some((count, expires_at)) => (count + 1, expires_at),
            None => (1, self.expiry(ttl)),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: Bytes::from(count.to_string()),
                expires_at,
            },
        );

        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
