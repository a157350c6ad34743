//! Subscriber setup: one registry with a stderr fmt layer, plus an
//! OpenTelemetry layer when a collector is configured and reachable to build.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{OtlpProtocol, TracingConfig, FALLBACK_LOG_LEVEL};

/// Keeps the tracer provider alive; flushes pending spans on drop.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracingGuard {
    /// Whether spans are being exported over OTLP.
    pub fn otlp_enabled(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
}

/// Install the global subscriber.
///
/// An exporter that fails to build never stops the gateway: the subscriber is
/// installed without the OpenTelemetry layer and the failure is logged once
/// logging works. Hold the guard for the lifetime of the process.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let (provider, export_error) = match config.otlp_endpoint() {
        Some(endpoint) => match build_provider(config, endpoint) {
            Ok(provider) => (Some(provider), None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr),
        )
        .with(env_filter(&config.log_level))
        .init();

    match (&provider, export_error) {
        (Some(_), _) => tracing::info!(
            endpoint = ?config.otlp_endpoint(),
            service = %config.service_name,
            protocol = ?config.protocol,
            "OpenTelemetry OTLP tracing initialized"
        ),
        (None, Some(e)) => tracing::warn!(
            error = %e,
            endpoint = ?config.otlp_endpoint(),
            "OTLP exporter failed to initialize, running with fmt-only tracing"
        ),
        (None, None) => {}
    }

    TracingGuard { provider }
}

fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_LEVEL))
}

/// Build a batching tracer provider exporting to `endpoint`.
fn build_provider(config: &TracingConfig, endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    let resource = Resource::builder_empty()
        .with_service_name(config.service_name.clone())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        // A bad directive must not abort startup.
        let filter = env_filter("hub_gateway=notalevel");
        assert_eq!(filter.to_string(), FALLBACK_LOG_LEVEL);
    }

    #[test]
    fn test_valid_filter_is_kept() {
        let filter = env_filter("hub_gateway=debug");
        assert_eq!(filter.to_string(), "hub_gateway=debug");
    }
}
