//! Health tracking for liveness and readiness probes
//!
//! The runtime component reflects the outcome of the most recent scrape, so a
//! daemon outage shows up on `/healthz` even though `/metrics` keeps
//! answering 200.

use crate::sampler::ScrapeOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but with partial results
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .fold(ComponentStatus::Healthy, |worst, s| match (worst, s) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const RUNTIME: &str = "runtime";
    pub const HTTP: &str = "http";
}

#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component, initially healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Derive runtime health from a scrape
    pub async fn record_scrape(&self, outcome: &ScrapeOutcome) {
        let health = if let Some(err) = &outcome.list_error {
            ComponentHealth::unhealthy(format!("container listing failed: {}", err))
        } else if outcome.containers_failed > 0 {
            ComponentHealth::degraded(format!(
                "{} of {} containers could not be sampled",
                outcome.containers_failed, outcome.containers_listed
            ))
        } else {
            ComponentHealth::healthy()
        };
        self.update(components::RUNTIME, health).await;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Exporter not yet serving".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Runtime unreachable".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeError;

    async fn registry() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.register(components::RUNTIME).await;
        registry.register(components::HTTP).await;
        registry
    }

    #[tokio::test]
    async fn test_initial_state_is_healthy_but_not_ready() {
        let registry = registry().await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_list_failure_marks_runtime_unhealthy() {
        let registry = registry().await;
        registry.set_ready(true).await;

        let outcome = ScrapeOutcome {
            list_error: Some(RuntimeError::NotFound("/1.0/containers".to_string())),
            ..Default::default()
        };
        registry.record_scrape(&outcome).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components[components::RUNTIME]
            .message
            .as_deref()
            .unwrap()
            .contains("listing failed"));
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_partial_failure_is_degraded() {
        let registry = registry().await;
        registry.set_ready(true).await;

        let outcome = ScrapeOutcome {
            containers_listed: 4,
            containers_failed: 1,
            ..Default::default()
        };
        registry.record_scrape(&outcome).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_recovery_after_successful_scrape() {
        let registry = registry().await;
        registry
            .update(components::RUNTIME, ComponentHealth::unhealthy("down"))
            .await;

        registry.record_scrape(&ScrapeOutcome::default()).await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }
}
