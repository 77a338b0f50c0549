//! Library for the LXD container metrics exporter
//!
//! This crate provides:
//! - A client for the LXD REST API over its unix socket
//! - Per-scrape sampling of container resource state
//! - The fixed container metric schema and its Prometheus rendering
//! - Health checks and the exporter's own observability
//! - The HTTP API serving `/metrics`

pub mod api;
pub mod health;
pub mod models;
pub mod observability;
pub mod runtime;
pub mod sampler;
pub mod schema;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use runtime::{ContainerRuntime, LxdClient, RuntimeError};
pub use sampler::{Sampler, ScrapeOutcome};
pub use schema::{Metric, MetricDescriptor, Sample, SchemaRegistry};
