//! Shared fixtures for integration tests

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use lfg_registry::bot::{LfgBot, Notifier, Outbox};
use lfg_registry::error::Result;
use lfg_registry::storage::{InMemoryRegistryStore, RegistryStore};
use lfg_registry::types::{Player, Role, Search};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Notifier that records every delivered message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(recipient, content)` pairs in delivery order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Messages delivered to one recipient
    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, content)| content)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_direct_message(&self, recipient_id: &str, content: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient_id.to_string(), content.to_string()));
        }
        Ok(())
    }
}

/// A bot wired to `store` with a recording notifier
pub fn create_test_bot(store: Arc<dyn RegistryStore>) -> (LfgBot, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let bot = LfgBot::new(store, Outbox::new(notifier.clone()));
    (bot, notifier)
}

pub fn create_memory_bot() -> (LfgBot, Arc<dyn RegistryStore>, Arc<RecordingNotifier>) {
    let store: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
    let (bot, notifier) = create_test_bot(store.clone());
    (bot, store, notifier)
}

pub fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|start| start.checked_add_days(Days::new(n)))
        .unwrap_or(NaiveDate::MIN)
}

pub fn create_test_player(id: &str, role: Role, sr: i32, touched: NaiveDate) -> Player {
    let mut player = Player::new(id, touched);
    player.role = role;
    player.sr = sr;
    player
}

pub fn create_test_search(
    owner: &str,
    role: Role,
    target_sr: Option<i32>,
    range: i32,
    touched: NaiveDate,
) -> Search {
    let mut search = Search::new(owner, touched);
    search.role = role;
    search.target_sr = target_sr;
    search.range = range;
    search
}

/// Unique snapshot path under the system temp directory
pub fn temp_database_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("lfg-registry-test-{}", uuid::Uuid::new_v4()))
        .join("registry.json")
}
