//! AMQP transport between the chat gateway and the bot
//!
//! Inbound direct messages arrive on a durable queue; replies and
//! notifications leave through a topic exchange.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{BotMessageHandler, DirectMessageConsumer, MessageHandler};
pub use messages::*;
pub use publisher::{AmqpNotifier, PublisherConfig};
