use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::payments::PaymentProvider;
use crate::store::Store;
use crate::utils::CircuitState;

// ============================================================================
// Health Checks
// ============================================================================
//
// Each dependency reports its own status; the service is as healthy as its
// worst component.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Unhealthy(_) => 2,
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
}

impl SystemHealth {
    fn from_components(components: Vec<ComponentHealth>) -> Self {
        let worst = components.iter().map(|c| c.status.severity()).max().unwrap_or(0);
        Self {
            // Degraded still serves traffic
            healthy: worst < 2,
            components,
        }
    }
}

pub struct HealthReporter {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
}

impl HealthReporter {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn check(&self) -> SystemHealth {
        let store = match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };

        // Checkout fails fast while open, but webhooks keep settling
        let provider = match self.provider.circuit_state().await {
            CircuitState::Closed => HealthStatus::Healthy,
            state => HealthStatus::Degraded(format!("circuit {}", state.as_str())),
        };

        let health = SystemHealth::from_components(vec![
            ComponentHealth::new("store", store),
            ComponentHealth::new("payment_provider", provider),
        ]);

        if !health.healthy {
            tracing::warn!(components = ?health.components, "Health check failed");
        }
        health
    }
}
