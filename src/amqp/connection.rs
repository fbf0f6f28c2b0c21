//! AMQP connection management with retry logic

use crate::error::{RegistryError, Result};
use amqprs::connection::{Connection, OpenConnectionArguments};
use anyhow::Context;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Configuration for AMQP connection
#[derive(Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            max_retries: 5,
            retry_delay_ms: 1000,
            connection_timeout_ms: 30000,
        }
    }
}

impl std::fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .finish()
    }
}

impl AmqpConfig {
    /// Build a config from an `amqp://host:port/vhost` URL.
    ///
    /// Credentials embedded in the URL take precedence over the supplied
    /// ones; a `%2f` vhost decodes to `/`.
    pub fn from_url(url: &str, username: &str, password: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("amqp://")
            .ok_or_else(|| RegistryError::ConfigurationError {
                message: format!("AMQP URL must start with amqp://, got '{}'", url),
            })?;

        let mut config = AmqpConfig {
            username: username.to_string(),
            password: password.to_string(),
            ..AmqpConfig::default()
        };

        let host_part = match rest.rsplit_once('@') {
            Some((credentials, host_part)) => {
                match credentials.split_once(':') {
                    Some((user, pass)) => {
                        config.username = user.to_string();
                        config.password = pass.to_string();
                    }
                    None => config.username = credentials.to_string(),
                }
                host_part
            }
            None => rest,
        };

        let (host_port, vhost) = match host_part.split_once('/') {
            Some((host_port, vhost)) if !vhost.is_empty() => {
                (host_port, vhost.replace("%2f", "/").replace("%2F", "/"))
            }
            Some((host_port, _)) => (host_port, "/".to_string()),
            None => (host_part, "/".to_string()),
        };
        config.vhost = vhost;

        match host_port.split_once(':') {
            Some((host, port)) => {
                config.host = host.to_string();
                config.port = port.parse().map_err(|_| RegistryError::ConfigurationError {
                    message: format!("Invalid AMQP port '{}'", port),
                })?;
            }
            None => config.host = host_port.to_string(),
        }

        if config.host.is_empty() {
            return Err(RegistryError::ConfigurationError {
                message: format!("AMQP URL '{}' has no host", url),
            }
            .into());
        }

        Ok(config)
    }
}

/// Wrapper around AMQP connection with additional metadata
pub struct AmqpConnection {
    connection: Connection,
    config: AmqpConfig,
}

impl AmqpConnection {
    /// Create a new AMQP connection with retry logic
    pub async fn new(config: AmqpConfig) -> Result<Self> {
        let connection = Self::connect_with_retry(&config).await?;

        Ok(Self { connection, config })
    }

    /// Attempt to connect with exponential backoff retry
    async fn connect_with_retry(config: &AmqpConfig) -> Result<Connection> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(config.retry_delay_ms);

        loop {
            match Self::try_connect(config).await {
                Ok(connection) => {
                    info!(
                        "Connected to AMQP broker {}:{} as '{}'",
                        config.host, config.port, config.username
                    );
                    return Ok(connection);
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > config.max_retries {
                        error!(
                            "Failed to connect to AMQP after {} retries",
                            config.max_retries
                        );
                        return Err(RegistryError::AmqpConnectionFailed {
                            message: format!("Max retries exceeded: {}", e),
                        }
                        .into());
                    }

                    warn!(
                        "AMQP connection attempt {} failed: {}. Retrying in {:?}",
                        retry_count, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(30000));
                }
            }
        }
    }

    /// Single connection attempt, bounded by the connection timeout
    async fn try_connect(config: &AmqpConfig) -> Result<Connection> {
        let mut args = OpenConnectionArguments::new(
            &config.host,
            config.port,
            &config.username,
            &config.password,
        );
        args.virtual_host(&config.vhost);

        let timeout = Duration::from_millis(config.connection_timeout_ms);
        match tokio::time::timeout(timeout, Connection::open(&args)).await {
            Ok(result) => result.context("Failed to open AMQP connection").map_err(|e| {
                RegistryError::AmqpConnectionFailed {
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => Err(RegistryError::AmqpConnectionFailed {
                message: format!("Connection timed out after {:?}", timeout),
            }
            .into()),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    /// Check if connection is still open
    pub fn is_alive(&self) -> bool {
        self.connection.is_open()
    }

    pub async fn close(self) -> Result<()> {
        self.connection
            .close()
            .await
            .context("Failed to close AMQP connection")
    }
}
