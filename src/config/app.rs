//! Main application configuration
//!
//! Settings come from defaults, then the environment or a TOML file, then
//! command line overrides applied in `main`.

use crate::amqp::messages::{DIRECT_MESSAGE_QUEUE, DIRECT_MESSAGE_ROUTING_KEY, OUTBOUND_EXCHANGE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub amqp: AmqpSettings,
    pub registry: RegistrySettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health and metrics endpoints
    pub metrics_port: u16,
    pub shutdown_timeout_seconds: u64,
}

/// AMQP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpSettings {
    /// Broker URL; the password comes from the command line
    pub url: String,
    /// Broker account of the bot
    pub username: String,
    /// Queue of inbound direct messages
    pub queue_name: String,
    /// Exchange for outbound direct messages
    pub exchange_name: String,
    pub routing_key: String,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
}

/// Registry storage and lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// JSON snapshot of the registry
    pub database_path: PathBuf,
    /// Keep records in memory only when false
    pub persist: bool,
    pub sweep_interval_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "lfg-registry".to_string(),
            log_level: "info".to_string(),
            metrics_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672/%2f".to_string(),
            username: "lfg-bot".to_string(),
            queue_name: DIRECT_MESSAGE_QUEUE.to_string(),
            exchange_name: OUTBOUND_EXCHANGE.to_string(),
            routing_key: DIRECT_MESSAGE_ROUTING_KEY.to_string(),
            connection_timeout_seconds: 30,
            max_retry_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("lfg_registry.json"),
            persist: true,
            sweep_interval_seconds: 86_400, // daily
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Some(port) = parse_var("METRICS_PORT")? {
            config.service.metrics_port = port;
        }
        if let Some(timeout) = parse_var("SHUTDOWN_TIMEOUT_SECONDS")? {
            config.service.shutdown_timeout_seconds = timeout;
        }

        if let Ok(url) = env::var("AMQP_URL") {
            config.amqp.url = url;
        }
        if let Ok(username) = env::var("AMQP_USERNAME") {
            config.amqp.username = username;
        }
        if let Ok(queue) = env::var("AMQP_QUEUE_NAME") {
            config.amqp.queue_name = queue;
        }
        if let Ok(exchange) = env::var("AMQP_EXCHANGE_NAME") {
            config.amqp.exchange_name = exchange;
        }
        if let Ok(routing_key) = env::var("AMQP_ROUTING_KEY") {
            config.amqp.routing_key = routing_key;
        }
        if let Some(timeout) = parse_var("AMQP_CONNECTION_TIMEOUT_SECONDS")? {
            config.amqp.connection_timeout_seconds = timeout;
        }
        if let Some(retries) = parse_var("AMQP_MAX_RETRY_ATTEMPTS")? {
            config.amqp.max_retry_attempts = retries;
        }
        if let Some(delay) = parse_var("AMQP_RETRY_DELAY_MS")? {
            config.amqp.retry_delay_ms = delay;
        }

        if let Ok(path) = env::var("REGISTRY_DATABASE_PATH") {
            config.registry.database_path = PathBuf::from(path);
        }
        if let Some(persist) = parse_var("REGISTRY_PERSIST")? {
            config.registry.persist = persist;
        }
        if let Some(interval) = parse_var("SWEEP_INTERVAL_SECONDS")? {
            config.registry.sweep_interval_seconds = interval;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn amqp_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.amqp.connection_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.amqp.url.is_empty() {
        return Err(anyhow!("AMQP URL cannot be empty"));
    }
    if config.amqp.username.is_empty() {
        return Err(anyhow!("AMQP username cannot be empty"));
    }
    if config.amqp.queue_name.is_empty() {
        return Err(anyhow!("AMQP queue name cannot be empty"));
    }
    if config.amqp.exchange_name.is_empty() {
        return Err(anyhow!("AMQP exchange name cannot be empty"));
    }
    if config.amqp.connection_timeout_seconds == 0 {
        return Err(anyhow!("AMQP connection timeout must be greater than 0"));
    }

    if config.registry.persist && config.registry.database_path.as_os_str().is_empty() {
        return Err(anyhow!("Database path cannot be empty when persisting"));
    }
    if config.registry.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        validate_config(&config).unwrap();
        assert_eq!(config.amqp.queue_name, "lfg.direct_messages");
        assert_eq!(config.amqp.exchange_name, "lfg.outbound");
        assert_eq!(config.sweep_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [service]
            metrics_port = 9191

            [registry]
            database_path = "/var/lib/lfg/registry.json"
            sweep_interval_seconds = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.service.metrics_port, 9191);
        assert_eq!(config.service.name, "lfg-registry");
        assert_eq!(
            config.registry.database_path,
            PathBuf::from("/var/lib/lfg/registry.json")
        );
        assert!(config.registry.persist);
        assert_eq!(config.amqp.username, "lfg-bot");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.registry.sweep_interval_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.registry.database_path = PathBuf::new();
        assert!(validate_config(&config).is_err());
        config.registry.persist = false;
        assert!(validate_config(&config).is_ok());

        assert!(AppConfig::from_toml_str("[service]\nmetrics_port = 0").is_err());
    }
}
