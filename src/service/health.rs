//! Health checks for the registry service
//!
//! [`ServiceStatus`] is the shared view the HTTP endpoints read; the
//! service updates it as the broker connection and sweeps come and go.

use crate::registry::SweepStats;
use crate::storage::{RegistryStore, StoreCounts};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn gauge_value(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.gauge_value() <= other.gauge_value() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// State of the broker link
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerLink {
    /// Running without a broker
    Disabled,
    Connected,
    Disconnected,
}

/// Outcome of the most recent lifecycle sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSweep {
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub stats: SweepStats,
}

/// Runtime status shared between the service and its health endpoints
pub struct ServiceStatus {
    name: String,
    started_at: Instant,
    store: Arc<dyn RegistryStore>,
    running: RwLock<bool>,
    broker: RwLock<BrokerLink>,
    last_sweep: RwLock<Option<LastSweep>>,
}

impl ServiceStatus {
    pub fn new(name: impl Into<String>, store: Arc<dyn RegistryStore>, broker: BrokerLink) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            store,
            running: RwLock::new(false),
            broker: RwLock::new(broker),
            last_sweep: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.running.write().await = running;
    }

    pub async fn broker(&self) -> BrokerLink {
        *self.broker.read().await
    }

    pub async fn set_broker(&self, link: BrokerLink) {
        *self.broker.write().await = link;
    }

    pub async fn last_sweep(&self) -> Option<LastSweep> {
        self.last_sweep.read().await.clone()
    }

    pub async fn record_sweep(&self, stats: SweepStats) {
        *self.last_sweep.write().await = Some(LastSweep {
            finished_at: chrono::Utc::now(),
            stats,
        });
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub stored: StoreCounts,
    pub last_sweep: Option<LastSweep>,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(status: &ServiceStatus) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(status).await,
            Self::check_store(status),
            Self::check_broker(status).await,
        ];

        let overall = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        let stored = status.store().counts().unwrap_or_default();

        Ok(HealthCheck {
            status: overall,
            service: status.name().to_string(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: ServiceStats {
                stored,
                last_sweep: status.last_sweep().await,
                uptime_seconds: status.uptime_seconds(),
            },
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if status.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the store must answer and replies must have a way out
    pub async fn readiness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if !status.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let store = Self::check_store(status).status;
        let broker = Self::check_broker(status).await.status;
        Ok(store.worst(broker))
    }

    async fn check_service_running(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();

        let (health, message) = if status.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_store(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();

        let (health, message) = match status.store().counts() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Registry store check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Store not readable: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "registry_store".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_broker(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();

        let (health, message) = match status.broker().await {
            BrokerLink::Connected => (HealthStatus::Healthy, None),
            BrokerLink::Disabled => (
                HealthStatus::Healthy,
                Some("Dry run, messages are logged only".to_string()),
            ),
            BrokerLink::Disconnected => (
                HealthStatus::Unhealthy,
                Some("AMQP connection lost".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
