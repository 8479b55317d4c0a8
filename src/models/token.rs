//! Token-related domain models
//!
//! This module defines the JWT claim set and the token values handed back
//! to callers.

use serde::{Deserialize, Serialize};

use super::user::Identity;

/// Which half of a token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by both access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,

    /// User email
    pub email: String,

    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expires at (unix seconds)
    pub exp: i64,

    /// Issuer
    pub iss: String,

    /// Unique token id
    pub jti: String,

    /// Token kind
    pub kind: TokenKind,
}

impl TokenClaims {
    /// Identity encoded in these claims
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.sub.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// Access token returned from a refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

/// Token pair returned from a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
