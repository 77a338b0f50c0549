//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus metrics about the exporter itself (scrape latency, runtime errors)
//! - Structured JSON logging with tracing

use crate::sampler::ScrapeOutcome;
use prometheus::{
    proto::MetricFamily, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for scrape latency (in seconds)
const SCRAPE_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Runtime call stages used as the `stage` label
pub mod stages {
    pub const LIST: &str = "list";
    pub const STATE: &str = "state";
}

/// Operational metrics for the exporter.
///
/// Backed by a private registry so multiple instances (e.g. in tests) never
/// collide on the process-wide default registry. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    scrape_duration_seconds: Histogram,
    scrapes_total: IntCounter,
    containers_scraped: IntGauge,
    runtime_errors_total: IntCounterVec,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scrape_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "lxd_exporter_scrape_duration_seconds",
                "Time spent sampling container state for one scrape",
            )
            .buckets(SCRAPE_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;

        let scrapes_total = IntCounter::new(
            "lxd_exporter_scrapes_total",
            "Total number of scrapes served",
        )?;
        registry.register(Box::new(scrapes_total.clone()))?;

        let containers_scraped = IntGauge::new(
            "lxd_exporter_containers_scraped",
            "Number of containers sampled in the last scrape",
        )?;
        registry.register(Box::new(containers_scraped.clone()))?;

        let runtime_errors_total = IntCounterVec::new(
            Opts::new(
                "lxd_exporter_runtime_errors_total",
                "Total number of failed runtime calls",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(runtime_errors_total.clone()))?;

        // Pre-create both stages so they are exported at zero.
        for stage in [stages::LIST, stages::STATE] {
            runtime_errors_total.with_label_values(&[stage]);
        }

        Ok(Self {
            registry,
            scrape_duration_seconds,
            scrapes_total,
            containers_scraped,
            runtime_errors_total,
        })
    }

    /// Record the result of one scrape
    pub fn record_scrape(&self, outcome: &ScrapeOutcome, elapsed: Duration) {
        self.scrapes_total.inc();
        self.scrape_duration_seconds.observe(elapsed.as_secs_f64());
        self.containers_scraped
            .set(outcome.containers_sampled() as i64);

        if outcome.list_error.is_some() {
            self.runtime_errors_total
                .with_label_values(&[stages::LIST])
                .inc();
        }
        if outcome.containers_failed > 0 {
            self.runtime_errors_total
                .with_label_values(&[stages::STATE])
                .inc_by(outcome.containers_failed as u64);
        }
    }

    pub fn runtime_errors(&self, stage: &str) -> u64 {
        self.runtime_errors_total.with_label_values(&[stage]).get()
    }

    pub fn scrapes(&self) -> u64 {
        self.scrapes_total.get()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    socket_path: String,
}

impl StructuredLogger {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, addr: &str) {
        info!(
            event = "exporter_started",
            runtime_socket = %self.socket_path,
            exporter_version = %version,
            addr = %addr,
            "LXD exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            runtime_socket = %self.socket_path,
            reason = %reason,
            "LXD exporter shutting down"
        );
    }

    /// Log a completed scrape. Degraded scrapes are logged at warn, clean ones at debug.
    pub fn log_scrape(&self, outcome: &ScrapeOutcome, elapsed: Duration) {
        if let Some(err) = &outcome.list_error {
            warn!(
                event = "scrape_completed",
                runtime_socket = %self.socket_path,
                error = %err,
                elapsed_ms = elapsed.as_millis() as u64,
                "Scrape served without container data"
            );
        } else if outcome.containers_failed > 0 {
            warn!(
                event = "scrape_completed",
                runtime_socket = %self.socket_path,
                containers = outcome.containers_listed,
                failed = outcome.containers_failed,
                samples = outcome.samples.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Scrape served with partial container data"
            );
        } else {
            debug!(
                event = "scrape_completed",
                runtime_socket = %self.socket_path,
                containers = outcome.containers_listed,
                samples = outcome.samples.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Scrape served"
            );
        }
    }
}
