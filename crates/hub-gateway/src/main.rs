//! hub-gateway: dual-mode gateway in front of the topic discovery backend.
//!
//! With a backend URL configured every API call is forwarded to it; without
//! one, a fixed set of routes is answered locally so the UI keeps working.

mod config;
mod error;
mod mock;
mod mode;
mod proxy;
mod server;

use std::time::Duration;

use config::{CliOverrides, GatewayConfig};
use server::AppState;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let flag_value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    };

    let config_path = flag_value("--config")
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("HUB_GATEWAY_CONFIG").ok())
        .unwrap_or_else(|| "hub-gateway.toml".to_string());

    let overrides = CliOverrides {
        backend_url: flag_value("--backend-url"),
        listen_address: flag_value("--listen"),
    };

    // Load configuration
    let config = GatewayConfig::load(&config_path, &overrides)?;

    // Build the tokio runtime first: the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize tracing (OTLP export is optional, falls back to fmt-only)
        let tracing_guard = hub_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            backend_url = ?config.backend.url,
            otlp = tracing_guard.otlp_enabled(),
            "Starting hub-gateway"
        );

        run(config).await
    })
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    // One pooled client for every forwarded call
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backend.timeout_secs))
        .build()?;

    let state = AppState::new(config, client);
    if state.mode.is_live_mode_enabled() {
        tracing::info!(backend = ?state.mode.base_url(), "Live mode: forwarding to backend");
    } else {
        tracing::info!("Mock mode: no backend configured, answering locally");
    }

    server::run(state).await
}
