//! User directory
//!
//! Resolves a login email to the stored credential record. Authgate only
//! reads from the directory; provisioning happens elsewhere.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteUserDirectory;

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::models::UserRecord;

/// Lookup interface over stored user records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by (already normalized) email
    ///
    /// Returns `Ok(None)` when no user has this email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;
}
