//! gridgated — the GridGate admission daemon.
//!
//! Loads configuration from the environment, wires the admission engine
//! to the carbon feed and (optionally) a pricing provider, and exposes
//! the host-facing HTTP surface:
//!
//! ```text
//! POST /v1/evaluate   workload JSON → admission decision (pre-filter)
//! POST /v1/release    release a concurrency slot (post-bind)
//! GET  /healthz       carbon feed reachability
//! GET  /metrics       Prometheus text exposition
//! ```
//!
//! Configuration is environment-only (see `gridgate-config`); a missing
//! or invalid configuration exits non-zero before anything starts.

mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gridgate_config::Settings;
use gridgate_core::SystemClock;
use gridgate_engine::GateEngine;
use gridgate_metrics::GateMetrics;
use gridgate_pricing::{ExternalProviderConfig, ProviderKind};
use gridgate_signal::{CarbonClient, ClientConfig};

#[derive(Parser)]
#[command(name = "gridgated", about = "Carbon- and price-aware workload admission gate")]
struct Cli {
    /// Address for the HTTP surface.
    #[arg(long, default_value = "0.0.0.0:8585")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("failed to load configuration")?;

    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(GateMetrics::new().context("failed to build metrics registry")?);

    let source = Arc::new(
        CarbonClient::new(
            ClientConfig {
                base_url: settings.api.base_url.clone(),
                api_key: settings.api.key.clone(),
                timeout: settings.api.timeout,
                max_retries: settings.api.max_retries,
                retry_delay: settings.api.retry_delay,
                rate_limit: settings.api.rate_limit,
            },
            clock.clone(),
        )
        .context("failed to build carbon client")?,
    );

    let pricing = if settings.pricing.enabled {
        let kind = ProviderKind::parse(&settings.pricing.provider)
            .context("failed to select pricing provider")?;
        let external = ExternalProviderConfig {
            base_url: settings.pricing.provider_url.clone(),
            api_key: settings.pricing.api_key.clone(),
            location_id: settings.pricing.location_id.clone(),
            timeout: settings.api.timeout,
            cache_ttl: ExternalProviderConfig::DEFAULT_CACHE_TTL,
        };
        Some(
            gridgate_pricing::from_kind(
                kind,
                settings.pricing.schedule.clone(),
                Some(external),
                clock.clone(),
            )
            .context("failed to build pricing provider")?,
        )
    } else {
        None
    };

    let engine = Arc::new(GateEngine::new(
        settings,
        source,
        pricing,
        clock,
        metrics.clone(),
    ));
    engine.spawn_probe();

    let app = api::router(api::AppState {
        engine: engine.clone(),
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(listen = %cli.listen, "gridgated started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    engine.close().await;
    Ok(())
}
