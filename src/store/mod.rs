//! Shared key-value stores
//!
//! Failed-attempt counters and refresh tokens live here. Redis is the
//! production backend; the in-memory store serves tests and single-instance
//! deployments.

pub mod traits;

mod memory;
mod redis;
mod retry;

pub use traits::{decode_counter, round_trip, KeyValueStore};

#[cfg(test)]
pub use traits::MockKeyValueStore;

pub use memory::MemoryStore;
pub use redis::{RedisStore, RedisStoreConfig};
pub use retry::{RetryManager, RetryingStore};
