//! AMQP consumer for inbound direct messages

use crate::amqp::messages::{DirectMessage, MessageUtils};
use crate::bot::LfgBot;
use crate::error::{RegistryError, Result};
use crate::metrics::MetricsCollector;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Interface for handling decoded direct messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_direct_message(&self, message: DirectMessage) -> Result<()>;

    /// Handle a message that could not be decoded or processed
    async fn handle_error(&self, error: RegistryError, message_data: &[u8]);
}

/// Forwards direct messages to the bot
pub struct BotMessageHandler {
    bot: Arc<LfgBot>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl BotMessageHandler {
    pub fn new(bot: Arc<LfgBot>) -> Self {
        Self { bot, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl MessageHandler for BotMessageHandler {
    async fn handle_direct_message(&self, message: DirectMessage) -> Result<()> {
        if message.author_is_bot {
            debug!("Ignoring message from bot account '{}'", message.sender_id);
            return Ok(());
        }

        let outcome = self
            .bot
            .on_direct_message(&message.sender_id, &message.content)
            .await;
        debug!("Reply to '{}': {:?}", message.sender_id, outcome);
        Ok(())
    }

    async fn handle_error(&self, error: RegistryError, message_data: &[u8]) {
        if let Some(metrics) = &self.metrics {
            metrics.record_amqp_operation("consume", false);
        }

        let preview_len = message_data.len().min(100);
        let preview = String::from_utf8_lossy(&message_data[..preview_len]);
        error!(
            "Dropping inbound message ({} bytes): {} - preview: {:?}",
            message_data.len(),
            error,
            preview
        );
    }
}

/// Consumer of the direct message queue
pub struct DirectMessageConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl DirectMessageConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("lfg-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag)
            .manual_ack(true)
            .finish();

        self.channel
            .basic_consume(InboundConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| RegistryError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming messages from queue: {}", queue_name);
        Ok(())
    }

    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| RegistryError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming messages");
        Ok(())
    }
}

/// Internal consumer implementation
struct InboundConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl InboundConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let message = MessageUtils::deserialize_direct_message(content)?;
        debug!(
            "Direct message from '{}' ({} chars)",
            message.sender_id,
            message.content.len()
        );
        self.handler.handle_direct_message(message).await
    }
}

#[async_trait]
impl AsyncConsumer for InboundConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let start_time = std::time::Instant::now();

        match self.process_message(&content).await {
            Ok(()) => debug!(
                "Message {} processed in {:.2}ms",
                delivery_tag,
                start_time.elapsed().as_secs_f64() * 1000.0
            ),
            Err(e) => {
                let error = match e.downcast::<RegistryError>() {
                    Ok(registry_error) => registry_error,
                    Err(other) => RegistryError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        // Malformed messages are dropped rather than redelivered
        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack message {}: {}", delivery_tag, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::notifier::MockNotifier;
    use crate::bot::Outbox;
    use crate::storage::InMemoryRegistryStore;

    fn bot_expecting_replies(replies: usize) -> Arc<LfgBot> {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_direct_message()
            .times(replies)
            .returning(|_, _| Ok(()));
        Arc::new(LfgBot::new(
            Arc::new(InMemoryRegistryStore::new()),
            Outbox::new(Arc::new(notifier)),
        ))
    }

    #[tokio::test]
    async fn test_human_message_gets_a_reply() {
        let handler = BotMessageHandler::new(bot_expecting_replies(1));
        handler
            .handle_direct_message(DirectMessage::new("42", "!help"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bot_authored_message_is_ignored() {
        let handler = BotMessageHandler::new(bot_expecting_replies(0));
        let mut message = DirectMessage::new("99", "!search");
        message.author_is_bot = true;
        handler.handle_direct_message(message).await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let handler = Arc::new(
            BotMessageHandler::new(bot_expecting_replies(0)).with_metrics(metrics.clone()),
        );
        let consumer = InboundConsumer::new(handler.clone());

        let err = consumer.process_message(b"{ broken").await.unwrap_err();
        let err = err.downcast::<RegistryError>().unwrap();
        assert!(matches!(err, RegistryError::InvalidMessage { .. }));

        handler.handle_error(err, b"{ broken").await;
        assert_eq!(
            metrics
                .service()
                .amqp_errors_total
                .with_label_values(&["consume"])
                .get(),
            1
        );
    }
}
