//! Main application state and service coordination
//!
//! [`AppState`] owns the registry store, the bot, the broker link and the
//! background tasks that drive sweeps and gauges.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{BotMessageHandler, DirectMessageConsumer};
use crate::amqp::publisher::{AmqpNotifier, PublisherConfig};
use crate::bot::{LfgBot, LoggingNotifier, Notifier, Outbox};
use crate::config::AppConfig;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::service::health::{BrokerLink, ServiceStatus};
use crate::storage::{FileRegistryStore, InMemoryRegistryStore, RegistryStore};
use crate::utils;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Startup choices taken from the command line
#[derive(Clone)]
pub struct StartupOptions {
    /// Broker password of the bot account
    pub credential: String,
    /// Wipe the persistent store before loading it
    pub reset: bool,
    /// Run without a broker; outbound messages are only logged
    pub dry_run: bool,
}

impl std::fmt::Debug for StartupOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupOptions")
            .field("credential", &"***")
            .field("reset", &self.reset)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RegistryStore>,
    bot: Arc<LfgBot>,
    status: Arc<ServiceStatus>,
    metrics_service: Arc<MetricsService>,
    amqp_connection: Option<AmqpConnection>,
    consumer: Option<DirectMessageConsumer>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig, options: StartupOptions) -> Result<Self, ServiceError> {
        info!("Initializing {} ({:?})", config.service.name, options);

        let store = Self::initialize_store(&config, options.reset)?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let (amqp_connection, notifier, broker) = if options.dry_run {
            info!("Dry run: no broker connection, outbound messages are logged");
            let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
            (None, notifier, BrokerLink::Disabled)
        } else {
            let connection = Self::initialize_amqp(&config, &options.credential).await?;
            let notifier =
                Self::initialize_notifier(&config, &connection, metrics_collector.clone()).await?;
            (Some(connection), notifier, BrokerLink::Connected)
        };

        let bot = Arc::new(
            LfgBot::new(store.clone(), Outbox::new(notifier))
                .with_metrics(metrics_collector.clone()),
        );

        let status = Arc::new(ServiceStatus::new(
            config.service.name.clone(),
            store.clone(),
            broker,
        ));

        let health_server = Arc::new(HealthServer::new(
            HealthServerConfig {
                port: config.service.metrics_port,
                host: "0.0.0.0".to_string(),
            },
            metrics_collector.clone(),
            status.clone(),
        ));
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            store,
            bot,
            status,
            metrics_service,
            amqp_connection,
            consumer: None,
            background_tasks: Vec::new(),
        })
    }

    /// Start the health endpoints, message consumption and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {}", self.config.service.name);

        self.status.set_running(true).await;

        self.start_metrics_service();
        self.start_amqp_consumption().await?;
        self.start_background_tasks();

        info!("✅ {} started", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        self.status.set_running(false).await;

        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        self.stop_background_tasks();

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        if let Some(connection) = self.amqp_connection.take() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            }
        }

        match self.store.counts() {
            Ok(counts) => info!(
                "Final registry: {} players, {} searches",
                counts.players, counts.searches
            ),
            Err(e) => warn!("Failed to count stored records: {}", e),
        }

        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.status.is_running().await
    }

    pub fn bot(&self) -> Arc<LfgBot> {
        self.bot.clone()
    }

    pub fn status(&self) -> Arc<ServiceStatus> {
        self.status.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    fn initialize_store(
        config: &AppConfig,
        reset: bool,
    ) -> Result<Arc<dyn RegistryStore>, ServiceError> {
        if !config.registry.persist {
            info!("Keeping the registry in memory only");
            return Ok(Arc::new(InMemoryRegistryStore::new()));
        }

        let path = &config.registry.database_path;
        let store =
            FileRegistryStore::open(path, reset).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open registry at {}: {}", path.display(), e),
            })?;
        info!("Registry loaded from {}", path.display());
        Ok(Arc::new(store))
    }

    async fn initialize_amqp(
        config: &AppConfig,
        credential: &str,
    ) -> Result<AmqpConnection, ServiceError> {
        let mut amqp_config = AmqpConfig::from_url(&config.amqp.url, &config.amqp.username, credential)
            .map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;
        amqp_config.connection_timeout_ms = config.amqp_connection_timeout().as_millis() as u64;

        info!(
            "Connecting to AMQP broker {}:{}",
            amqp_config.host, amqp_config.port
        );
        AmqpConnection::new(amqp_config)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })
    }

    async fn initialize_notifier(
        config: &AppConfig,
        connection: &AmqpConnection,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Arc<dyn Notifier>, ServiceError> {
        let channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange: config.amqp.exchange_name.clone(),
            routing_key: config.amqp.routing_key.clone(),
            ..PublisherConfig::default()
        };
        let notifier = AmqpNotifier::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize notifier: {}", e),
            })?
            .with_metrics(metrics_collector);

        Ok(Arc::new(notifier))
    }

    fn start_metrics_service(&mut self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });
        self.background_tasks.push(handle);

        info!("Metrics and health endpoints on port {}", port);
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        let Some(connection) = &self.amqp_connection else {
            debug!("No broker connection, skipping message consumption");
            return Ok(());
        };

        let queue_name = self.config.amqp.queue_name.clone();
        let channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();
        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        let handler = Arc::new(
            BotMessageHandler::new(self.bot.clone())
                .with_metrics(self.metrics_service.collector()),
        );
        let consumer = DirectMessageConsumer::new(handler, channel);
        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        self.consumer = Some(consumer);
        info!("Listening for direct messages on '{}'", queue_name);
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        let sweep_interval = self.config.sweep_interval();
        info!(
            "Starting lifecycle sweep task ({}s interval)",
            sweep_interval.as_secs()
        );
        let sweep_task = spawn_sweep_task(self.bot.clone(), self.status.clone(), sweep_interval);

        info!("Starting service gauges task (30s interval)");
        let gauges_task = {
            let status = self.status.clone();
            let store = self.store.clone();
            let metrics_collector = self.metrics_service.collector();
            let broker_alive = self.amqp_connection.as_ref().map(|c| c.connection().clone());

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));

                while status.is_running().await {
                    interval.tick().await;

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(status.uptime_seconds() as i64);

                    match store.counts() {
                        Ok(counts) => {
                            metrics_collector.update_store_counts(counts);
                            metrics_collector.update_component_health("registry_store", true);
                        }
                        Err(e) => {
                            warn!("Failed to count stored records: {}", e);
                            metrics_collector.update_component_health("registry_store", false);
                        }
                    }

                    if let Some(connection) = &broker_alive {
                        let link = if connection.is_open() {
                            BrokerLink::Connected
                        } else {
                            BrokerLink::Disconnected
                        };
                        if link == BrokerLink::Disconnected {
                            error!("AMQP connection is closed");
                        }
                        status.set_broker(link).await;
                        metrics_collector
                            .update_component_health("amqp", link == BrokerLink::Connected);
                    }
                }

                debug!("Service gauges task stopped");
            })
        };

        self.background_tasks.push(sweep_task);
        self.background_tasks.push(gauges_task);
        info!("{} background tasks running", self.background_tasks.len());
    }

    fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        for task in self.background_tasks.drain(..) {
            task.abort();
        }
        info!("Stopped {} background tasks", task_count);
    }
}

/// Run the lifecycle sweep now and then every `sweep_interval` while the
/// service is running
fn spawn_sweep_task(
    bot: Arc<LfgBot>,
    status: Arc<ServiceStatus>,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The first tick completes immediately
        let mut interval = tokio::time::interval(sweep_interval);

        while status.is_running().await {
            interval.tick().await;

            let summary = bot.run_daily_sweep(utils::today()).await;
            info!(
                "Sweep finished: {} players and {} searches purged, {} players and {} searches expiring",
                summary.stats.players_purged,
                summary.stats.searches_purged,
                summary.stats.players_expiring,
                summary.stats.searches_expiring
            );
            status.record_sweep(summary.stats).await;
        }

        info!("Lifecycle sweep task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistrySettings;

    fn dry_run_config() -> AppConfig {
        AppConfig {
            registry: RegistrySettings {
                persist: false,
                ..RegistrySettings::default()
            },
            ..AppConfig::default()
        }
    }

    fn dry_run() -> StartupOptions {
        StartupOptions {
            credential: "unused".to_string(),
            reset: false,
            dry_run: true,
        }
    }

    #[tokio::test]
    async fn test_dry_run_state_handles_messages() {
        let state = AppState::new(dry_run_config(), dry_run()).await.unwrap();
        assert!(!state.is_running().await);
        assert_eq!(state.status().broker().await, BrokerLink::Disabled);

        let reply = state.bot().handle_direct_message("7", "!sr 2500").await;
        assert!(reply.contains("2500"));
    }

    #[tokio::test]
    async fn test_shutdown_marks_service_stopped() {
        let mut state = AppState::new(dry_run_config(), dry_run()).await.unwrap();
        state.status.set_running(true).await;

        state.shutdown().await.unwrap();
        assert!(!state.is_running().await);
    }

    #[tokio::test]
    async fn test_first_sweep_runs_at_startup() {
        let state = AppState::new(dry_run_config(), dry_run()).await.unwrap();
        let long_ago = utils::today() - chrono::Days::new(12);
        state
            .status()
            .store()
            .get_or_create_player("idle", long_ago)
            .unwrap();
        state.status().set_running(true).await;

        let task = spawn_sweep_task(
            state.bot(),
            state.status(),
            Duration::from_secs(3600),
        );

        let sweep = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(sweep) = state.status().last_sweep().await {
                    return sweep;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first sweep did not run at startup");

        assert_eq!(sweep.stats.players_purged, 1);
        assert!(state.status().store().get_player("idle").unwrap().is_none());
        task.abort();
    }

    #[test]
    fn test_options_debug_hides_credential() {
        let options = StartupOptions {
            credential: "hunter2".to_string(),
            reset: true,
            dry_run: false,
        };
        assert!(!format!("{:?}", options).contains("hunter2"));
    }
}
