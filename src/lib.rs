//! LFG Registry - looking-for-group bot for team games
//!
//! Players register a profile (skill rating, role, description) and search
//! for teammates through direct-message commands. Searches can be saved so
//! their owners are notified when a matching player updates a profile, and
//! idle records expire after a grace period.

pub mod amqp;
pub mod bot;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RegistryError, Rejection, Result};
pub use types::*;

pub use bot::{LfgBot, Notifier, Outbox};
pub use registry::{LifecycleSweeper, MatchingEngine};
pub use storage::{FileRegistryStore, InMemoryRegistryStore, RegistryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
