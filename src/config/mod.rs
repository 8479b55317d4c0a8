//! Configuration management for authgate
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::{AttemptLimitConfig, TokenConfig};
use crate::store::RedisStoreConfig;

/// Prefix for configuration environment variables
const ENV_PREFIX: &str = "AUTHGATE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token and rate limit configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Key-value store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// User directory configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix AUTHGATE_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = env_var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_var("SERVER_PORT") {
            config.server.port = parse_env("SERVER_PORT", &port)?;
        }

        if let Some(secret) = env_var("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Some(issuer) = env_var("JWT_ISSUER") {
            config.auth.issuer = issuer;
        }
        if let Some(ttl) = env_var("ACCESS_TOKEN_TTL_SECS") {
            config.auth.access_token_ttl_secs = parse_env("ACCESS_TOKEN_TTL_SECS", &ttl)?;
        }
        if let Some(ttl) = env_var("REFRESH_TOKEN_TTL_SECS") {
            config.auth.refresh_token_ttl_secs = parse_env("REFRESH_TOKEN_TTL_SECS", &ttl)?;
        }
        if let Some(max) = env_var("RATE_LIMIT_MAX_ATTEMPTS") {
            config.auth.rate_limit.max_attempts = parse_env("RATE_LIMIT_MAX_ATTEMPTS", &max)?;
        }
        if let Some(window) = env_var("RATE_LIMIT_WINDOW_SECS") {
            config.auth.rate_limit.window_secs = parse_env("RATE_LIMIT_WINDOW_SECS", &window)?;
        }

        if let Some(backend) = env_var("STORE_BACKEND") {
            config.store.backend = parse_env("STORE_BACKEND", &backend)?;
        }
        if let Some(url) = env_var("REDIS_URL") {
            config.store.url = url;
        }
        if let Some(prefix) = env_var("REDIS_PREFIX") {
            config.store.prefix = prefix;
        }

        if let Some(path) = env_var("DIRECTORY_PATH") {
            config.directory.path = path;
        }

        if let Some(enabled) = env_var("OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(endpoint) = env_var("OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let Some(level) = env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Check values that serde defaults cannot guarantee
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.jwt_secret".to_string()));
        }
        if self.auth.access_token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.access_token_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.auth.refresh_token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.refresh_token_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.auth.rate_limit.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limit.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.auth.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limit.window_secs must be greater than 0".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.is_empty() {
            return Err(ConfigError::MissingRequired("store.url".to_string()));
        }
        if self.store.command_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "store.command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.store.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "store.retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidValue(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Token and login throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens
    #[serde(default)]
    pub jwt_secret: String,

    /// Value of the `iss` claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Access token lifetime in seconds
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,

    /// Failed login limits
    #[serde(default)]
    pub rate_limit: AuthRateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            rate_limit: AuthRateLimitConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Token issuer settings
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.jwt_secret.clone(),
            issuer: self.issuer.clone(),
            access_ttl: Duration::from_secs(self.access_token_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_token_ttl_secs),
        }
    }

    /// Orchestrator settings
    pub fn orchestrator_config(&self) -> crate::auth::AuthConfig {
        crate::auth::AuthConfig {
            token: self.token_config(),
            rate_limit: self.rate_limit.limiter_config(),
        }
    }
}

fn default_issuer() -> String {
    "authgate".to_string()
}

fn default_access_ttl() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

/// Rate limiting configuration for failed logins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthRateLimitConfig {
    /// Failed attempts allowed per window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in seconds, fixed from the first failure
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window(),
        }
    }
}

impl AuthRateLimitConfig {
    pub fn limiter_config(&self) -> AttemptLimitConfig {
        AttemptLimitConfig {
            max_attempts: self.max_attempts,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window() -> u64 {
    60
}

/// Which key-value store backend to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Store backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Key prefix
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Retry configuration for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_redis_url(),
            prefix: default_redis_prefix(),
            command_timeout_ms: default_command_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn redis_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.url.clone(),
            prefix: self.prefix.clone(),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_prefix() -> String {
    "authgate:".to_string()
}

fn default_command_timeout() -> u64 {
    2000
}

/// Retry configuration for store operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    1
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// User directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryConfig {
    /// Path to SQLite database file
    #[serde(default = "default_directory_path")]
    pub path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: default_directory_path(),
        }
    }
}

fn default_directory_path() -> String {
    "/data/db/authgate.db".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "authgate".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, value)))
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax; unknown variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
