//! LXD Exporter - Prometheus exporter for LXD container metrics
//!
//! Serves `/metrics` by querying the local LXD daemon on every scrape.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    api::{self, AppState},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    LxdClient, Sampler, SchemaRegistry,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let config = config::ExporterConfig::load(&cli)?;
    info!(port = config.port, "Exporter configured");

    let runtime = LxdClient::from_env();
    let logger = StructuredLogger::new(runtime.socket_path().display().to_string());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::HTTP).await;

    let metrics = ExporterMetrics::new().context("Failed to register exporter metrics")?;
    let sampler = Sampler::new(Arc::new(runtime));

    let app_state = Arc::new(AppState::new(
        SchemaRegistry::new(),
        sampler,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));

    let listener = match api::bind(config.port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = config.port, error = %e, "Failed to bind listener");
            return Err(e).with_context(|| format!("Failed to bind port {}", config.port));
        }
    };

    logger.log_startup(EXPORTER_VERSION, &format!("0.0.0.0:{}", config.port));
    health_registry.set_ready(true).await;

    api::serve(listener, app_state, shutdown_signal())
        .await
        .context("API server failed")?;

    logger.log_shutdown("SIGINT received");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
