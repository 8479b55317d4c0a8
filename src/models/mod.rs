//! Domain models for authgate
//!
//! This module contains the core domain models used throughout the service.

pub mod token;
pub mod user;

// Re-export commonly used types
pub use token::{AccessToken, TokenClaims, TokenKind, TokenPair};
pub use user::{Identity, UserRecord};
