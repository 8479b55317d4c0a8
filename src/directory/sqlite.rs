//! SQLite implementation of the UserDirectory trait
//!
//! Uses rusqlite through tokio-rusqlite so queries run on a dedicated
//! thread instead of blocking the runtime.

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::UserDirectory;
use crate::error::DirectoryError;
use crate::models::UserRecord;

/// SQLite-backed user directory
pub struct SqliteUserDirectory {
    conn: Connection,
}

impl SqliteUserDirectory {
    /// Open the directory at `path`, creating the schema if needed
    ///
    /// Use `:memory:` for an in-memory directory.
    pub async fn new(path: &str) -> Result<Self, DirectoryError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory directory (useful for testing)
    pub async fn in_memory() -> Result<Self, DirectoryError> {
        Self::new(":memory:").await
    }

    /// Insert or replace a user record
    ///
    /// The email is stored as given; callers provisioning users should pass
    /// it trimmed and lowercased to match login lookups.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<(), DirectoryError> {
        let roles = serde_json::to_string(&user.roles)
            .map_err(|e| DirectoryError::Serialization(e.to_string()))?;
        let id = user.id.clone();
        let email = user.email.clone();
        let password_hash = user.password_hash.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO users (id, email, password_hash, roles)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    rusqlite::params![id, email, password_hash, roles],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// Number of stored users
    pub async fn count(&self) -> Result<u64, DirectoryError> {
        let count: i64 = self
            .conn
            .call(|conn| {
                let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let email = email.to_string();

        let row: Option<(String, String, String, String)> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, email, password_hash, roles FROM users WHERE email = ?1",
                        [&email],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(|(id, email, password_hash, roles)| {
            let roles: Vec<String> = serde_json::from_str(&roles).map_err(|e| {
                DirectoryError::Serialization(format!("roles for user {}: {}", id, e))
            })?;
            Ok(UserRecord {
                id,
                email,
                password_hash,
                roles,
            })
        })
        .transpose()
    }
}
