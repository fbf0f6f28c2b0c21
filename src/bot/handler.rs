//! Looking-for-group bot
//!
//! Turns direct messages into registry operations and replies, fans out
//! "new players" notifications after profile changes, and runs the daily
//! expiration sweep.

use crate::bot::command::{help_text, Command, CommandKind, ProfileUpdate, NOT_A_COMMAND_REPLY};
use crate::bot::notifier::{DeliveryOutcome, Outbox};
use crate::error::{Rejection, Result};
use crate::metrics::MetricsCollector;
use crate::registry::expiration::RecordKind;
use crate::registry::sweeper::{ExpiringEntry, LifecycleSweeper, SweepStats};
use crate::registry::{validate_and_build_search, MatchingEngine, SearchAction};
use crate::storage::RegistryStore;
use crate::types::Player;
use crate::utils::{dedup_preserving_order, today};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const NO_PLAYERS_FOUND: &str = "*No players found*";
pub const SEARCH_CREATED: &str = "\n\n*Search created*";
pub const SEARCHES_DELETED: &str = "*Search(es) deleted.*";
pub const SEARCH_DELETE_FAILED: &str =
    "***Could not delete entry(s).\nPlease contact administrator.***";
pub const SEARCH_CREATE_FAILED: &str =
    "***Could not create entry.\nPlease contact administrator.***";
pub const ACCOUNT_DELETED: &str = "*Player-Account deleted*";
pub const ACCOUNT_DELETE_FAILED: &str =
    "***Could not delete entry.\nPlease contact administrator.***";
pub const EXPIRY_RESET: &str = "*Expiredate reset*";
pub const EXPIRY_RESET_FAILED: &str =
    "***Could not update entry.\nPlease contact administrator.***";
pub const PLAYER_LOOKUP_FAILED: &str =
    "***Fatal error: user not found.***\n*Please contact administrator!*";
pub const PROFILE_UPDATE_FAILED: &str =
    "***Could not update entry.\nPlease contact administrator.***";
pub const NEW_PLAYERS_AVAILABLE: &str = "*New players of interest are available*";

/// Warning sent for an entry that is about to expire
pub fn expiry_warning(kind: RecordKind) -> String {
    format!(
        "*Your {}-Entry will be deleted in 3 days. Please use '!update' if you want to prevent this.*",
        kind
    )
}

/// Notice sent for an entry that a sweep deleted
pub fn deletion_notice(kind: RecordKind) -> String {
    format!(
        "*Your {}-Entry was deleted due to inactivity. Create a new one to be found again.*",
        kind
    )
}

/// Result of a daily sweep run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub stats: SweepStats,
    pub notifications: Vec<(ExpiringEntry, DeliveryOutcome)>,
}

/// The bot: command handling, notification fan-out and sweeps
pub struct LfgBot {
    store: Arc<dyn RegistryStore>,
    engine: MatchingEngine,
    sweeper: LifecycleSweeper,
    outbox: Outbox,
    metrics: Option<Arc<MetricsCollector>>,
}

impl LfgBot {
    pub fn new(store: Arc<dyn RegistryStore>, outbox: Outbox) -> Self {
        Self {
            engine: MatchingEngine::new(store.clone()),
            sweeper: LifecycleSweeper::new(store.clone()),
            store,
            outbox,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle one inbound direct message and send the reply
    pub async fn on_direct_message(&self, sender_id: &str, text: &str) -> DeliveryOutcome {
        let reply = self.handle_direct_message(sender_id, text).await;
        let outcome = self.outbox.reply(sender_id, &reply).await;
        self.record_delivery(outcome);

        if reply == ACCOUNT_DELETED {
            self.outbox.forget(sender_id);
        }
        outcome
    }

    /// Compute the reply to a direct message; an empty reply means nothing
    /// should be sent.
    pub async fn handle_direct_message(&self, sender_id: &str, text: &str) -> String {
        self.handle_direct_message_on(sender_id, text, today()).await
    }

    /// [`Self::handle_direct_message`] with an explicit current date
    pub async fn handle_direct_message_on(
        &self,
        sender_id: &str,
        text: &str,
        today: NaiveDate,
    ) -> String {
        let started = Instant::now();
        let kind = CommandKind::route(text);
        debug!("Direct message from '{}' routed as {:?}", sender_id, kind);

        let result = match Command::parse(text) {
            Ok(command) => self.execute(sender_id, command, today).await,
            Err(rejection) => Err(rejection),
        };

        let rejected = result.is_err();
        if let Some(metrics) = &self.metrics {
            metrics.record_command(kind, rejected, started.elapsed());
        }

        match result {
            Ok(reply) => reply,
            Err(rejection) => {
                debug!("Rejected {:?} from '{}': {}", kind, sender_id, rejection);
                rejection.to_string()
            }
        }
    }

    async fn execute(
        &self,
        sender_id: &str,
        command: Command,
        today: NaiveDate,
    ) -> std::result::Result<String, Rejection> {
        match command {
            Command::Search { directive } => self.search(sender_id, &directive, today),
            Command::Update => Ok(self.touch(sender_id, today)),
            Command::Delete => Ok(self.delete_account(sender_id)),
            Command::Help => Ok(help_text()),
            Command::Profile(update) => Ok(self.update_profile(sender_id, update, today).await),
            Command::NotACommand => Ok(NOT_A_COMMAND_REPLY.to_string()),
        }
    }

    fn search(
        &self,
        sender_id: &str,
        directive: &str,
        today: NaiveDate,
    ) -> std::result::Result<String, Rejection> {
        let parsed = validate_and_build_search(sender_id, directive, today)?;

        if parsed.action == SearchAction::Delete {
            return Ok(match self.delete_searches_of(sender_id) {
                Ok(count) => {
                    info!("Deleted {} searches of '{}'", count, sender_id);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_searches_deleted(count);
                    }
                    SEARCHES_DELETED.to_string()
                }
                Err(e) => {
                    error!("Failed to delete searches of '{}': {}", sender_id, e);
                    self.record_persistence_error("delete_search");
                    SEARCH_DELETE_FAILED.to_string()
                }
            });
        }

        let players = self.engine.find_players(&parsed.search);
        let mut reply = if players.is_empty() {
            NO_PLAYERS_FOUND.to_string()
        } else {
            players
                .iter()
                .map(Player::to_string)
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        if parsed.action == SearchAction::Notify {
            let mut search = parsed.search;
            search.normalize();
            match self.store.create_search(&search) {
                Ok(stored) => {
                    info!(
                        "Stored search {:?} of '{}' ({} {}..{})",
                        stored.id,
                        sender_id,
                        stored.role,
                        stored.min_sr(),
                        stored.max_sr()
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_search_created();
                    }
                    reply.push_str(SEARCH_CREATED);
                }
                Err(e) => {
                    error!("Failed to store search of '{}': {}", sender_id, e);
                    self.record_persistence_error("create_search");
                    return Ok(SEARCH_CREATE_FAILED.to_string());
                }
            }
        }

        Ok(reply)
    }

    fn delete_searches_of(&self, owner_id: &str) -> Result<usize> {
        let mut deleted = 0;
        for search in self.store.searches_by_owner(owner_id)? {
            if let Some(id) = search.id {
                if self.store.delete_search(id)? {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    /// Reset the expiration of the sender's profile and searches
    fn touch(&self, sender_id: &str, today: NaiveDate) -> String {
        match self.touch_records(sender_id, today) {
            Ok(touched) => {
                debug!("Touched {} records of '{}'", touched, sender_id);
                EXPIRY_RESET.to_string()
            }
            Err(e) => {
                error!("Failed to reset expiration for '{}': {}", sender_id, e);
                self.record_persistence_error("touch");
                EXPIRY_RESET_FAILED.to_string()
            }
        }
    }

    fn touch_records(&self, owner_id: &str, today: NaiveDate) -> Result<usize> {
        let mut touched = 0;
        if let Some(mut player) = self.store.get_player(owner_id)? {
            player.last_touched = today;
            self.store.upsert_player(&player)?;
            touched += 1;
        }
        for mut search in self.store.searches_by_owner(owner_id)? {
            search.last_touched = today;
            if self.store.update_search(&search)? {
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn delete_account(&self, sender_id: &str) -> String {
        let result = self
            .store
            .delete_player(sender_id)
            .and_then(|_| self.delete_searches_of(sender_id));

        match result {
            Ok(searches) => {
                info!(
                    "Deleted account of '{}' with {} searches",
                    sender_id, searches
                );
                ACCOUNT_DELETED.to_string()
            }
            Err(e) => {
                error!("Failed to delete account of '{}': {}", sender_id, e);
                self.record_persistence_error("delete_player");
                ACCOUNT_DELETE_FAILED.to_string()
            }
        }
    }

    async fn update_profile(
        &self,
        sender_id: &str,
        update: ProfileUpdate,
        today: NaiveDate,
    ) -> String {
        let mut player = match self.store.get_or_create_player(sender_id, today) {
            Ok(player) => player,
            Err(e) => {
                error!("Failed to load player '{}': {}", sender_id, e);
                self.record_persistence_error("get_or_create_player");
                return PLAYER_LOOKUP_FAILED.to_string();
            }
        };

        match update {
            ProfileUpdate::Sr(sr) => player.sr = sr,
            ProfileUpdate::Role(role) => player.role = role,
            ProfileUpdate::Description(text) => player.description = Some(text),
        }
        player.last_touched = today;

        if let Err(e) = self.store.upsert_player(&player) {
            error!("Failed to update player '{}': {}", sender_id, e);
            self.record_persistence_error("upsert_player");
            return PROFILE_UPDATE_FAILED.to_string();
        }

        self.on_player_update(&player).await;
        player.to_string()
    }

    /// Notify every owner of a search the updated player now satisfies,
    /// once per owner.
    pub async fn on_player_update(&self, player: &Player) -> Vec<(String, DeliveryOutcome)> {
        let owners: Vec<String> = self
            .engine
            .find_searches(player)
            .into_iter()
            .map(|search| search.owner_id)
            .collect();
        let owners = dedup_preserving_order(&owners);

        if !owners.is_empty() {
            debug!(
                "Player '{}' matches searches of {} users",
                player.user_id,
                owners.len()
            );
        }

        let mut outcomes = Vec::with_capacity(owners.len());
        for owner in owners {
            let outcome = self.outbox.notify(&owner, NEW_PLAYERS_AVAILABLE).await;
            self.record_delivery(outcome);
            outcomes.push((owner, outcome));
        }
        outcomes
    }

    /// Run one expiration sweep and message the owner of every reported
    /// entry.
    pub async fn run_daily_sweep(&self, today: NaiveDate) -> SweepSummary {
        let started = Instant::now();
        let report = self.sweeper.sweep(today);

        let mut notifications = Vec::with_capacity(report.entries.len());
        for entry in report.entries.iter() {
            let message = if entry.purged {
                deletion_notice(entry.kind)
            } else {
                expiry_warning(entry.kind)
            };
            let outcome = self.outbox.notify(&entry.owner_id, &message).await;
            self.record_delivery(outcome);
            if entry.purged && entry.kind == RecordKind::Player {
                self.outbox.forget(&entry.owner_id);
            }
            notifications.push((entry.clone(), outcome));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(&report, started.elapsed());
            match self.store.counts() {
                Ok(counts) => metrics.update_store_counts(counts),
                Err(e) => warn!("Failed to count stored records: {}", e),
            }
        }

        SweepSummary {
            stats: report.stats,
            notifications,
        }
    }

    fn record_delivery(&self, outcome: DeliveryOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_notification(outcome);
        }
    }

    fn record_persistence_error(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_persistence_error(operation);
        }
    }
}
