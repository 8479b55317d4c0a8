//! Server-side refresh token records
//!
//! One record per user holds the refresh token currently considered valid.
//! `put` overwrites unconditionally, which is what invalidates the previous
//! token on re-login.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{AuthError, StoreError};
use crate::store::KeyValueStore;

/// Store key prefix for refresh records
const KEY_PREFIX: &str = "refresh_token:";

/// Refresh token records over the shared key-value store
pub struct RefreshTokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl RefreshTokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Register `token` as the only valid refresh token for `user_id`
    pub async fn put(&self, user_id: &str, token: &str, ttl: Duration) -> Result<(), AuthError> {
        self.store
            .set(&record_key(user_id), Bytes::copy_from_slice(token.as_bytes()), ttl)
            .await?;
        Ok(())
    }

    /// The currently registered refresh token for `user_id`, if any
    pub async fn get(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        let Some(value) = self.store.get(&record_key(user_id)).await? else {
            return Ok(None);
        };

        let token = String::from_utf8(value.to_vec())
            .map_err(|e| StoreError::Serialization(format!("refresh record: {}", e)))?;
        Ok(Some(token))
    }

    /// Delete the record for `user_id`; a no-op when absent
    pub async fn revoke(&self, user_id: &str) -> Result<(), AuthError> {
        self.store.delete(&record_key(user_id)).await?;
        Ok(())
    }
}

fn record_key(user_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, user_id)
}
