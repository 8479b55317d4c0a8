//! HTTP server components for authgate
//!
//! This module provides the HTTP transport for the auth core:
//! - Router configuration and route handlers
//! - Bearer authentication, role checks and logging middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{AuthResponse, AuthenticatedUser, ADMIN_ROLES};
pub use router::{build_router, AppState, HealthResponse, LoginRequest, RefreshRequest};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::directory::UserDirectory;

/// HTTP Server for authgate
pub struct Server<U: UserDirectory + 'static> {
    config: ServerConfig,
    state: AppState<U>,
}

impl<U: UserDirectory + 'static> Server<U> {
    pub fn new(config: ServerConfig, state: AppState<U>) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid host: {}", self.config.host)))?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// Run the server until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr()?;
        let app = build_router(self.state)
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .layer(tower_http::compression::CompressionLayer::new());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
