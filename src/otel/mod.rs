//! Logging and telemetry for authgate
//!
//! Log output goes through `tracing`. OTLP export of spans and metrics is
//! optional and off by default; the auth metrics are always registered so
//! handlers never have to check whether telemetry is on.

use crate::config::{LoggingConfig, OtelConfig};
use crate::error::AuthError;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Tracer and meter providers, exporting over OTLP when enabled
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        if !config.enabled {
            return Ok(Self {
                tracer_provider: None,
                meter_provider: SdkMeterProvider::builder().with_resource(resource).build(),
                config: config.clone(),
            });
        }

        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| OtelError::Config("OTLP endpoint is required when enabled".into()))?;

        let tracer_provider = build_tracer_provider(endpoint, &resource)?;
        global::set_tracer_provider(tracer_provider.clone());

        Ok(Self {
            tracer_provider: Some(tracer_provider),
            meter_provider: build_meter_provider(endpoint, &resource)?,
            config: config.clone(),
        })
    }

    /// Get a tracer; a no-op tracer when export is disabled
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and shut the meter provider down
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                result.map_err(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)))?;
            }
        }

        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn build_tracer_provider(endpoint: &str, resource: &Resource) -> Result<TracerProvider, OtelError> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime;
    use opentelemetry_sdk::trace::{Config, Sampler};

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| OtelError::TracerInit(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(resource.clone()),
        )
        .build())
}

fn build_meter_provider(endpoint: &str, resource: &Resource) -> Result<SdkMeterProvider, OtelError> {
    use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
    use opentelemetry_sdk::metrics::reader::{
        DefaultAggregationSelector, DefaultTemporalitySelector,
    };
    use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

    let exporter = MetricsExporterBuilder::from(
        opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint),
    )
    .build_metrics_exporter(
        Box::new(DefaultTemporalitySelector::new()),
        Box::new(DefaultAggregationSelector::new()),
    )
    .map_err(|e| OtelError::MeterInit(e.to_string()))?;

    Ok(SdkMeterProvider::builder()
        .with_resource(resource.clone())
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .build())
}

/// Auth service metrics
pub struct Metrics {
    /// Login attempts by outcome
    pub logins_total: Counter<u64>,

    /// Refresh attempts by outcome
    pub refreshes_total: Counter<u64>,

    pub logouts_total: Counter<u64>,

    /// HTTP request duration in seconds
    pub request_duration: Histogram<f64>,
}

impl Metrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            logins_total: meter
                .u64_counter("authgate_logins_total")
                .with_description("Login attempts by outcome")
                .init(),
            refreshes_total: meter
                .u64_counter("authgate_refreshes_total")
                .with_description("Token refresh attempts by outcome")
                .init(),
            logouts_total: meter
                .u64_counter("authgate_logouts_total")
                .with_description("Completed logouts")
                .init(),
            request_duration: meter
                .f64_histogram("authgate_request_duration_seconds")
                .with_description("HTTP request duration in seconds")
                .init(),
        }
    }

    pub fn record_login<T>(&self, result: &Result<T, AuthError>) {
        self.logins_total
            .add(1, &[KeyValue::new("outcome", outcome(result))]);
    }

    pub fn record_refresh<T>(&self, result: &Result<T, AuthError>) {
        self.refreshes_total
            .add(1, &[KeyValue::new("outcome", outcome(result))]);
    }

    pub fn record_logout(&self) {
        self.logouts_total.add(1, &[]);
    }

    pub fn record_request_duration(&self, method: &str, route: &str, status: u16, secs: f64) {
        self.request_duration.record(
            secs,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("route", route.to_string()),
                KeyValue::new("status", i64::from(status)),
            ],
        );
    }
}

/// Metric label for the result of an auth operation
pub fn outcome<T>(result: &Result<T, AuthError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AuthError::RateLimited) => "rate_limited",
        Err(AuthError::InvalidCredentials) => "invalid_credentials",
        Err(AuthError::TokenInvalid) => "invalid_token",
        Err(AuthError::TokenRevoked) => "revoked",
        Err(AuthError::ServiceUnavailable(_)) => "unavailable",
        Err(AuthError::Internal(_)) => "internal",
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global tracing subscriber
///
/// Adds the OpenTelemetry layer when export is enabled and formats events as
/// JSON or human-readable text per `logging.format`.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));
    let json = logging.format != "pretty";

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("authgate")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().pretty()))
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
