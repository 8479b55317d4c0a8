//! authgate - Credential authentication and session tokens
//!
//! This is the main entry point for the authgate service.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use authgate::auth::AuthOrchestrator;
use authgate::config::{Config, StoreBackend};
use authgate::directory::SqliteUserDirectory;
use authgate::otel::{init_tracing, Metrics, OtelProvider};
use authgate::server::{AppState, Server};
use authgate::store::{
    round_trip, KeyValueStore, MemoryStore, RedisStore, RetryManager, RetryingStore,
};

/// authgate - Credential authentication and session tokens
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTHGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting authgate");

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));

    let store = build_store(&config).await?;

    match round_trip(store.as_ref()).await {
        Ok(()) => info!(backend = ?config.store.backend, "Store health check passed"),
        Err(e) => warn!(
            backend = ?config.store.backend,
            error = %e,
            "Store health check failed, continuing"
        ),
    }

    let directory = Arc::new(SqliteUserDirectory::new(&config.directory.path).await?);
    info!(path = %config.directory.path, "User directory initialized");

    let orchestrator = AuthOrchestrator::new(
        directory,
        Arc::clone(&store),
        config.auth.orchestrator_config(),
    );
    info!(
        max_attempts = config.auth.rate_limit.max_attempts,
        window_secs = config.auth.rate_limit.window_secs,
        "Auth orchestrator initialized"
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        metrics: Some(metrics),
    };

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("authgate shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment, then validate it
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // tracing is not initialized yet
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    Ok(config)
}

/// Connect the configured backend and wrap it with retries
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let retry = RetryManager::new(config.store.retry.clone());

    let store: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::Redis => {
            let redis = RedisStore::connect(config.store.redis_config()).await?;
            Arc::new(RetryingStore::new(redis, retry))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; counters and refresh tokens are not shared");
            Arc::new(RetryingStore::new(MemoryStore::new(), retry))
        }
    };

    Ok(store)
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
