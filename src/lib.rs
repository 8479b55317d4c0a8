//! authgate - Credential authentication and session tokens
//!
//! This crate verifies email/password credentials against a user directory,
//! throttles repeated failures through a shared key-value store, and issues
//! signed access and refresh tokens whose refresh half can be revoked.

pub mod auth;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod otel;
pub mod server;
pub mod store;
