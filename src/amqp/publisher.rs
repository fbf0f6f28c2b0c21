//! Outbound direct messages over AMQP

use crate::amqp::messages::{
    MessageUtils, OutboundMessage, DIRECT_MESSAGE_ROUTING_KEY, OUTBOUND_EXCHANGE,
};
use crate::bot::Notifier;
use crate::error::{RegistryError, Result};
use crate::metrics::MetricsCollector;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for outbound publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub routing_key: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: OUTBOUND_EXCHANGE.to_string(),
            routing_key: DIRECT_MESSAGE_ROUTING_KEY.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            publish_timeout_ms: 5000,
        }
    }
}

/// [`Notifier`] that hands direct messages to the chat gateway
pub struct AmqpNotifier {
    channel: Channel,
    config: PublisherConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AmqpNotifier {
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let notifier = Self {
            channel,
            config,
            metrics: None,
        };
        notifier.setup_exchange().await?;
        Ok(notifier)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            RegistryError::AmqpConnectionFailed {
                message: format!("Failed to declare outbound exchange: {}", e),
            }
        })?;

        info!("Declared outbound exchange {}", self.config.exchange);
        Ok(())
    }

    /// Publish with exponential backoff
    async fn publish_with_retry(&self, correlation_id: &str, payload: &[u8]) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(correlation_id, payload).await {
                Ok(()) => {
                    debug!(
                        "Published message {} to exchange {}",
                        correlation_id, self.config.exchange
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish(&self, correlation_id: &str, payload: &[u8]) -> Result<()> {
        let args = BasicPublishArguments::new(&self.config.exchange, &self.config.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(correlation_id)
            .with_timestamp(chrono::Utc::now().timestamp() as u64)
            .with_content_type("application/json");

        let timeout = Duration::from_millis(self.config.publish_timeout_ms);
        let publish = self
            .channel
            .basic_publish(properties, payload.to_vec(), args);

        match tokio::time::timeout(timeout, publish).await {
            Ok(result) => result.map_err(|e| {
                RegistryError::AmqpConnectionFailed {
                    message: format!("Failed to publish message: {}", e),
                }
                .into()
            }),
            Err(_) => Err(RegistryError::AmqpConnectionFailed {
                message: format!("Publish timed out after {:?}", timeout),
            }
            .into()),
        }
    }
}

#[async_trait]
impl Notifier for AmqpNotifier {
    async fn send_direct_message(&self, recipient_id: &str, content: &str) -> Result<()> {
        let (correlation_id, payload) = MessageUtils::serialize_outbound(
            OutboundMessage {
                recipient_id: recipient_id.to_string(),
                content: content.to_string(),
            },
            &self.config.routing_key,
        )?;

        let result = self.publish_with_retry(&correlation_id, &payload).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_amqp_operation("publish", result.is_ok());
        }
        result
    }
}
