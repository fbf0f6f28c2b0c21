//! The looking-for-group bot
//!
//! Commands arrive as direct messages; replies and notifications leave
//! through an [`Outbox`] in front of a transport [`Notifier`].

pub mod command;
pub mod handler;
pub mod notifier;

pub use command::{Command, CommandKind, ProfileUpdate};
pub use handler::{LfgBot, SweepSummary};
pub use notifier::{DeliveryOutcome, LoggingNotifier, Notifier, Outbox};
