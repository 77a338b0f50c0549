//! Exporter configuration
//!
//! The listening port is the only setting. Sources, lowest to highest
//! precedence: built-in default, `EXPORTER_PORT`, `--port`.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Export LXD container metrics for Prometheus
#[derive(Debug, Parser)]
#[command(name = "lxd-exporter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// HTTP port for /metrics and health endpoints
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl ExporterConfig {
    /// Load configuration from the environment and command line
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::from_sources(config::Environment::with_prefix("EXPORTER"), cli.port)
    }

    fn from_sources(env: config::Environment, port: Option<u16>) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("port", i64::from(default_port()))?
            .add_source(env)
            .set_override_option("port", port.map(i64::from))?
            .build()
            .context("Failed to assemble configuration")?;

        config
            .try_deserialize()
            .context("Invalid exporter configuration")
    }
}
