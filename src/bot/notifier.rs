//! Outbound direct messages
//!
//! [`Notifier`] is the transport seam; [`Outbox`] sits in front of it and
//! remembers the last text delivered to every user so that an unsolicited
//! notification identical to it is not sent again.

use crate::error::Result;
use crate::types::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Delivers a direct message to a user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_direct_message(&self, recipient_id: &str, content: &str) -> Result<()>;
}

/// Notifier that only logs; used when running without a broker
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_direct_message(&self, recipient_id: &str, content: &str) -> Result<()> {
        info!("[dry-run] DM to '{}': {:?}", recipient_id, content);
        Ok(())
    }
}

/// What happened to one outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    Sent,
    /// Identical to the last message the recipient got, or empty
    Suppressed,
    Failed,
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Suppressed => "suppressed",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

/// Last text delivered to one recipient
type Slot = Arc<Mutex<Option<String>>>;

/// Deduplicating front of a [`Notifier`].
///
/// Sends to one recipient are serialized; different recipients never wait
/// on each other.
pub struct Outbox {
    notifier: Arc<dyn Notifier>,
    slots: StdMutex<HashMap<UserId, Slot>>,
}

impl Outbox {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    /// Send a reply to a command. Replies are always sent but are
    /// remembered for deduplication of later notifications.
    pub async fn reply(&self, recipient_id: &str, content: &str) -> DeliveryOutcome {
        self.deliver(recipient_id, content, false).await
    }

    /// Send an unsolicited message unless the recipient's last message is
    /// identical.
    pub async fn notify(&self, recipient_id: &str, content: &str) -> DeliveryOutcome {
        self.deliver(recipient_id, content, true).await
    }

    /// Last text delivered to `recipient_id`
    pub async fn last_sent(&self, recipient_id: &str) -> Option<String> {
        let slot = self.slots().get(recipient_id).cloned()?;
        let last = slot.lock().await;
        last.clone()
    }

    /// Drop what is remembered about `recipient_id`
    pub fn forget(&self, recipient_id: &str) {
        if self.slots().remove(recipient_id).is_some() {
            debug!("Forgot last message of '{}'", recipient_id);
        }
    }

    /// Number of recipients with a remembered message
    pub fn tracked_recipients(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, recipient_id: &str) -> Slot {
        self.slots()
            .entry(recipient_id.to_string())
            .or_default()
            .clone()
    }

    async fn deliver(&self, recipient_id: &str, content: &str, dedup: bool) -> DeliveryOutcome {
        if content.is_empty() {
            return DeliveryOutcome::Suppressed;
        }

        // Held across the send so concurrent identical notifications collapse
        let slot = self.slot(recipient_id);
        let mut last_sent = slot.lock().await;
        if dedup && last_sent.as_deref() == Some(content) {
            debug!("Suppressing repeated message to '{}'", recipient_id);
            return DeliveryOutcome::Suppressed;
        }

        match self
            .notifier
            .send_direct_message(recipient_id, content)
            .await
        {
            Ok(()) => {
                *last_sent = Some(content.to_string());
                DeliveryOutcome::Sent
            }
            Err(e) => {
                warn!("Could not send message to user '{}': {}", recipient_id, e);
                DeliveryOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_notify_suppresses_identical_resend() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_direct_message()
            .with(eq("42"), eq("hello"))
            .times(1)
            .returning(|_, _| Ok(()));
        let outbox = Outbox::new(Arc::new(notifier));

        assert_eq!(outbox.notify("42", "hello").await, DeliveryOutcome::Sent);
        assert_eq!(
            outbox.notify("42", "hello").await,
            DeliveryOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn test_replies_count_as_last_message() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_direct_message()
            .times(2)
            .returning(|_, _| Ok(()));
        let outbox = Outbox::new(Arc::new(notifier));

        assert_eq!(outbox.reply("42", "same").await, DeliveryOutcome::Sent);
        // Replies are never deduplicated
        assert_eq!(outbox.reply("42", "same").await, DeliveryOutcome::Sent);
        assert_eq!(outbox.notify("42", "same").await, DeliveryOutcome::Suppressed);
        assert_eq!(outbox.last_sent("42").await.as_deref(), Some("same"));
    }

    #[tokio::test]
    async fn test_dedup_is_per_recipient() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_direct_message()
            .times(2)
            .returning(|_, _| Ok(()));
        let outbox = Outbox::new(Arc::new(notifier));

        assert_eq!(outbox.notify("a", "ping").await, DeliveryOutcome::Sent);
        assert_eq!(outbox.notify("b", "ping").await, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_failed_send_is_not_remembered() {
        let mut notifier = MockNotifier::new();
        let mut attempts = 0;
        notifier
            .expect_send_direct_message()
            .times(2)
            .returning(move |_, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(anyhow::anyhow!("channel closed"))
                } else {
                    Ok(())
                }
            });
        let outbox = Outbox::new(Arc::new(notifier));

        assert_eq!(outbox.notify("42", "retry").await, DeliveryOutcome::Failed);
        assert!(outbox.last_sent("42").await.is_none());
        assert_eq!(outbox.notify("42", "retry").await, DeliveryOutcome::Sent);
    }

    /// Blocks sends to "slow" until released
    struct StalledNotifier {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn send_direct_message(&self, recipient_id: &str, _content: &str) -> Result<()> {
            if recipient_id == "slow" {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_recipient_does_not_block_others() {
        let notifier = Arc::new(StalledNotifier {
            started: Notify::new(),
            release: Notify::new(),
        });
        let outbox = Arc::new(Outbox::new(notifier.clone()));

        let pending = tokio::spawn({
            let outbox = outbox.clone();
            async move { outbox.notify("slow", "hello").await }
        });
        notifier.started.notified().await;

        let other = tokio::time::timeout(Duration::from_secs(1), outbox.reply("b", "hello")).await;
        assert_eq!(other.ok(), Some(DeliveryOutcome::Sent));

        notifier.release.notify_one();
        assert_eq!(pending.await.unwrap(), DeliveryOutcome::Sent);
        assert_eq!(outbox.last_sent("slow").await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_forget_drops_remembered_message() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_direct_message()
            .times(2)
            .returning(|_, _| Ok(()));
        let outbox = Outbox::new(Arc::new(notifier));

        assert_eq!(outbox.notify("42", "bye").await, DeliveryOutcome::Sent);
        assert_eq!(outbox.tracked_recipients(), 1);

        outbox.forget("42");
        assert_eq!(outbox.tracked_recipients(), 0);
        assert!(outbox.last_sent("42").await.is_none());
        assert_eq!(outbox.notify("42", "bye").await, DeliveryOutcome::Sent);
    }

    #[tokio::test]
    async fn test_empty_message_is_never_sent() {
        let notifier = MockNotifier::new();
        let outbox = Outbox::new(Arc::new(notifier));
        assert_eq!(outbox.reply("42", "").await, DeliveryOutcome::Suppressed);
    }
}
