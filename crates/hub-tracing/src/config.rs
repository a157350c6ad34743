//! The `[tracing]` section of the gateway configuration.

use serde::Deserialize;

/// Where gateway logs and spans go.
///
/// Logs are always written to stderr. Spans are additionally exported over
/// OTLP when [`otlp_endpoint`](Self::otlp_endpoint) resolves to an address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `service.name` resource attribute on exported spans.
    pub service_name: String,

    /// Collector address, e.g. "http://otel-collector:4317". Blank disables export.
    #[serde(rename = "otlp_endpoint")]
    pub otlp_endpoint_raw: Option<String>,

    pub protocol: OtlpProtocol,

    /// `EnvFilter` directives, e.g. "hub_gateway=debug,tower_http=info".
    pub log_level: String,

    /// Colored log output. Turn off when stderr is collected by a log shipper.
    pub ansi: bool,
}

/// OTLP transport protocol.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// Filter used when `log_level` does not parse.
pub const FALLBACK_LOG_LEVEL: &str = "info";

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "hub-gateway".to_string(),
            otlp_endpoint_raw: None,
            protocol: OtlpProtocol::Grpc,
            log_level: FALLBACK_LOG_LEVEL.to_string(),
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// The collector address with surrounding whitespace removed, or `None`
    /// when export is off.
    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint_raw
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_otlp() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "hub-gateway");
        assert!(config.otlp_endpoint().is_none());
        assert_eq!(config.protocol, OtlpProtocol::Grpc);
        assert_eq!(config.log_level, "info");
        assert!(config.ansi);
    }

    #[test]
    fn test_blank_endpoint_disables_otlp() {
        for raw in ["", "   ", "\t\n"] {
            let config = TracingConfig {
                otlp_endpoint_raw: Some(raw.to_string()),
                ..TracingConfig::default()
            };
            assert_eq!(config.otlp_endpoint(), None, "raw {raw:?}");
        }
    }

    #[test]
    fn test_endpoint_is_trimmed() {
        let config = TracingConfig {
            otlp_endpoint_raw: Some("  http://collector:4317 ".to_string()),
            ..TracingConfig::default()
        };
        assert_eq!(config.otlp_endpoint(), Some("http://collector:4317"));
    }
}
