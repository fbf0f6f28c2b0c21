//! AMQP message definitions and serialization

use crate::error::{RegistryError, Result};
use crate::types::UserId;
use serde::{Deserialize, Serialize};

/// Queue the chat gateway publishes inbound direct messages to
pub const DIRECT_MESSAGE_QUEUE: &str = "lfg.direct_messages";

/// Topic exchange for messages the bot sends
pub const OUTBOUND_EXCHANGE: &str = "lfg.outbound";

/// Routing key of outbound direct messages
pub const DIRECT_MESSAGE_ROUTING_KEY: &str = "dm.send";

/// Routing key of inbound direct messages
pub const INBOUND_ROUTING_KEY: &str = "dm.received";

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    pub fn new(payload: T, routing_key: impl Into<String>) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key: routing_key.into(),
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            RegistryError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            RegistryError::InvalidMessage {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// A direct message a user sent to the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub sender_id: UserId,
    pub content: String,
    /// Set when the author is itself a bot account
    #[serde(default)]
    pub author_is_bot: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DirectMessage {
    pub fn new(sender_id: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            content: content.into(),
            author_is_bot: false,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A direct message the bot asks the gateway to deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: UserId,
    pub content: String,
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Decode and validate an inbound direct message
    pub fn deserialize_direct_message(bytes: &[u8]) -> Result<DirectMessage> {
        let envelope = MessageEnvelope::<DirectMessage>::from_bytes(bytes)?;
        Self::validate_direct_message(&envelope.payload)?;
        Ok(envelope.payload)
    }

    pub fn validate_direct_message(message: &DirectMessage) -> Result<()> {
        if message.sender_id.trim().is_empty() {
            return Err(RegistryError::InvalidMessage {
                reason: "Sender ID cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Wrap and serialize an outbound direct message
    pub fn serialize_outbound(
        message: OutboundMessage,
        routing_key: &str,
    ) -> Result<(String, Vec<u8>)> {
        if message.recipient_id.trim().is_empty() {
            return Err(RegistryError::InvalidMessage {
                reason: "Recipient ID cannot be empty".to_string(),
            }
            .into());
        }
        let envelope = MessageEnvelope::new(message, routing_key);
        let bytes = envelope.to_bytes()?;
        Ok((envelope.correlation_id, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(DirectMessage::new("42", "!help"), INBOUND_ROUTING_KEY);

        assert_eq!(envelope.routing_key, "dm.received");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_direct_message_decoding() {
        let envelope = MessageEnvelope::new(DirectMessage::new("42", "!sr 2500"), INBOUND_ROUTING_KEY);
        let bytes = envelope.to_bytes().unwrap();

        let message = MessageUtils::deserialize_direct_message(&bytes).unwrap();
        assert_eq!(message.sender_id, "42");
        assert_eq!(message.content, "!sr 2500");
        assert!(!message.author_is_bot);
    }

    #[test]
    fn test_author_flag_defaults_to_human() {
        let raw = br#"{
            "payload": {"sender_id": "7", "content": "hi", "timestamp": "2024-06-15T10:00:00Z"},
            "correlation_id": "abc",
            "timestamp": "2024-06-15T10:00:00Z",
            "routing_key": "dm.received"
        }"#;
        let message = MessageUtils::deserialize_direct_message(raw).unwrap();
        assert!(!message.author_is_bot);
    }

    #[test]
    fn test_invalid_direct_messages() {
        assert!(MessageUtils::deserialize_direct_message(b"not json").is_err());

        let envelope = MessageEnvelope::new(DirectMessage::new("  ", "hi"), INBOUND_ROUTING_KEY);
        let bytes = envelope.to_bytes().unwrap();
        assert!(MessageUtils::deserialize_direct_message(&bytes).is_err());
    }

    #[test]
    fn test_outbound_serialization() {
        let (correlation_id, bytes) = MessageUtils::serialize_outbound(
            OutboundMessage {
                recipient_id: "42".to_string(),
                content: "*Expiredate reset*".to_string(),
            },
            DIRECT_MESSAGE_ROUTING_KEY,
        )
        .unwrap();

        let envelope = MessageEnvelope::<OutboundMessage>::from_bytes(&bytes).unwrap();
        assert_eq!(envelope.correlation_id, correlation_id);
        assert_eq!(envelope.routing_key, DIRECT_MESSAGE_ROUTING_KEY);
        assert_eq!(envelope.payload.recipient_id, "42");

        assert!(MessageUtils::serialize_outbound(
            OutboundMessage {
                recipient_id: String::new(),
                content: "x".to_string(),
            },
            DIRECT_MESSAGE_ROUTING_KEY,
        )
        .is_err());
    }
}
