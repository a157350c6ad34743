//! Configuration types and loading logic.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use hub_tracing::TracingConfig;
use serde::Deserialize;

/// Environment variable holding the backend base URL. Empty or unset selects
/// mock mode.
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Top-level gateway configuration.
///
/// Loaded once at startup and never mutated afterwards; handlers read it
/// through the shared application state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Backend (live mode) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the processing backend, e.g. `http://localhost:8000`.
    /// `None` or empty means the gateway runs in mock mode.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Overrides applied from the command line. Highest priority.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub backend_url: Option<String>,
    pub listen_address: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:3080".to_string()
}

fn default_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. CLI overrides
    /// 2. `BACKEND_URL` for the backend base URL
    /// 3. Environment variables (HUB_ prefix, __ for nesting)
    /// 4. TOML config file (optional)
    /// 5. Defaults
    pub fn load(config_path: &str, overrides: &CliOverrides) -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(Env::prefixed("HUB_").split("__")),
            std::env::var(BACKEND_URL_ENV).ok(),
            overrides,
        )
    }

    fn from_figment(
        mut figment: Figment,
        backend_url_env: Option<String>,
        overrides: &CliOverrides,
    ) -> anyhow::Result<Self> {
        if let Some(url) = backend_url_env {
            figment = figment.merge(Serialized::default("backend.url", url));
        }
        if let Some(ref url) = overrides.backend_url {
            figment = figment.merge(Serialized::default("backend.url", url));
        }
        if let Some(ref addr) = overrides.listen_address {
            figment = figment.merge(Serialized::default("server.listen_address", addr));
        }

        let config: GatewayConfig = figment.extract()?;
        Ok(config)
    }
}
