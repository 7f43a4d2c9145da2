//! OpenTelemetry tracing and observability

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

#[cfg(feature = "observability")]
use std::sync::OnceLock;
#[cfg(feature = "observability")]
use opentelemetry::{global, KeyValue};
#[cfg(feature = "observability")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "observability")]
use opentelemetry_sdk::trace::SdkTracerProvider;
#[cfg(feature = "observability")]
use opentelemetry_sdk::Resource;
#[cfg(feature = "observability")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "observability")]
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "observability")]
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing, exporting spans over OTLP when `config.otlp` names an endpoint.
///
/// Without an `otlp` config section (or without the `observability` feature compiled in)
/// this degrades to the plain JSON-formatted subscriber, matching the host framework's
/// "feature absent, log a degraded mode rather than fail startup" pattern.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    let otlp = config.otlp.as_ref().filter(|o| o.enabled);
    let Some(otlp) = otlp else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(&log_level))
            .init();
        tracing::info!("Tracing initialized for service: {} (no OTLP endpoint configured)", config.service.name);
        return Ok(());
    };

    let service_name = otlp
        .service_name
        .clone()
        .unwrap_or_else(|| config.service.name.clone());

    let resource = Resource::builder_empty()
        .with_attributes(vec![KeyValue::new("service.name", service_name.clone())])
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp.endpoint)
        .build()
        .map_err(|e| crate::error::Error::Internal(format!("failed to build OTLP exporter: {e}")))?;

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());
    let _ = TRACER_PROVIDER.set(provider.clone());

    let tracer = provider.tracer(service_name);
    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter(&log_level))
        .with(telemetry_layer)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("failed to install tracing subscriber: {e}")))?;

    tracing::info!(endpoint = %otlp.endpoint, "Tracing initialized for service: {} (OTLP export enabled)", config.service.name);

    Ok(())
}

/// Initialize tracing without OpenTelemetry (fallback when the feature is not compiled in)
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(&log_level))
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Flush any batched spans and shut down the tracer provider.
#[cfg(feature = "observability")]
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "failed to shut down OTLP tracer provider cleanly");
        }
    }
    tracing::info!("Tracing shutdown complete");
}

/// Shutdown tracing (no-op without observability feature)
#[cfg(not(feature = "observability"))]
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown (no-op)");
}
