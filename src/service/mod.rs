//! Service layer: application state, background tasks and health

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError, StartupOptions};
pub use health::{BrokerLink, HealthCheck, HealthStatus, ServiceStatus};
