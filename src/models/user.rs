//! User-related domain models

use serde::{Deserialize, Serialize};

/// Credential record as held by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Opaque user id
    pub id: String,

    /// Login email
    pub email: String,

    /// Argon2 PHC hash of the password
    pub password_hash: String,

    /// Role names
    pub roles: Vec<String>,
}

impl UserRecord {
    /// Create a new record without roles
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            roles: Vec::new(),
        }
    }

    /// Set roles
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }
}

/// Authenticated identity, free of credential material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl From<&UserRecord> for Identity {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
        }
    }
}
