//! HTTP API: Prometheus scrape endpoint plus health checks

use crate::{
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    sampler::Sampler,
    schema::{SchemaError, SchemaRegistry},
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub schema: SchemaRegistry,
    pub sampler: Sampler,
    pub health_registry: HealthRegistry,
    pub metrics: ExporterMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        schema: SchemaRegistry,
        sampler: Sampler,
        health_registry: HealthRegistry,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            schema,
            sampler,
            health_registry,
            metrics,
            logger,
        }
    }
}

/// Failure to render the scrape response
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "Metrics rendering failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus scrape endpoint.
///
/// Runtime failures only shrink the sample set; the response is 200 unless
/// encoding itself fails.
async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let start = Instant::now();
    let outcome = state.sampler.collect().await;
    let elapsed = start.elapsed();

    state.metrics.record_scrape(&outcome, elapsed);
    state.health_registry.record_scrape(&outcome).await;
    state.logger.log_scrape(&outcome, elapsed);

    let mut families = state.schema.gather(&outcome.samples)?;
    families.extend(state.metrics.gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        state
            .health_registry
            .update(components::HTTP, ComponentHealth::degraded(e.to_string()))
            .await;
        return Err(e.into());
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buffer,
    )
        .into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind the listener on all interfaces
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "API server listening");
    Ok(listener)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
