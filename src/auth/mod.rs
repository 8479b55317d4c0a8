//! Authentication core for authgate
//!
//! This module provides:
//! - Failed-login limiting per email
//! - JWT access and refresh token issuing
//! - Server-side refresh token records
//! - Password hashing and role matching

pub mod limiter;
pub mod manager;
pub mod password;
pub mod refresh;
pub mod roles;
pub mod token;

pub use limiter::{AttemptLimitConfig, AttemptLimiter};
pub use manager::{normalize_email, AuthConfig, AuthOrchestrator};
pub use password::{Argon2Hasher, PasswordHasher};
pub use refresh::RefreshTokenStore;
pub use roles::has_any_role;
pub use token::{TokenConfig, TokenIssuer};
