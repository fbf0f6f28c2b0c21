//! Periodic purge of expired records
//!
//! For searches and then players, independently: scan everything touched at
//! least [`STALE_AFTER_DAYS`] days ago, delete what is purgeable, then scan
//! the same window again. Whatever remains, together with what was deleted
//! in this pass, is reported so owners can be notified.
//!
//! [`STALE_AFTER_DAYS`]: crate::registry::expiration::STALE_AFTER_DAYS

use crate::error::Result;
use crate::registry::expiration::{stale_cutoff, Expirable, Freshness, RecordKind};
use crate::storage::RegistryStore;
use crate::types::{Player, Search, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A record reported by a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringEntry {
    pub owner_id: UserId,
    pub kind: RecordKind,
    /// Player id or search id, unique within `kind`
    pub record_key: String,
    pub last_touched: NaiveDate,
    pub state: Freshness,
    /// Deleted during the sweep that reported it
    pub purged: bool,
}

impl ExpiringEntry {
    fn from_record<E: Expirable>(
        record: &E,
        record_key: String,
        now: NaiveDate,
        purged: bool,
    ) -> Self {
        Self {
            owner_id: record.owner_id().clone(),
            kind: record.record_kind(),
            record_key,
            last_touched: record.last_touched(),
            state: record.freshness(now),
            purged,
        }
    }
}

/// Totals of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    pub players_purged: usize,
    pub searches_purged: usize,
    pub players_expiring: usize,
    pub searches_expiring: usize,
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries to notify about, each record at most once
    pub entries: Vec<ExpiringEntry>,
    pub stats: SweepStats,
}

/// Record set the sweeper can scan and delete from
trait SweepTarget: Expirable + Sized {
    fn scan(store: &dyn RegistryStore, cutoff: NaiveDate) -> Result<Vec<Self>>;
    fn delete(&self, store: &dyn RegistryStore) -> Result<bool>;
    fn record_key(&self) -> String;
}

impl SweepTarget for Player {
    fn scan(store: &dyn RegistryStore, cutoff: NaiveDate) -> Result<Vec<Self>> {
        store.players_touched_on_or_before(cutoff)
    }

    fn delete(&self, store: &dyn RegistryStore) -> Result<bool> {
        store.delete_player(&self.user_id)
    }

    fn record_key(&self) -> String {
        self.user_id.clone()
    }
}

impl SweepTarget for Search {
    fn scan(store: &dyn RegistryStore, cutoff: NaiveDate) -> Result<Vec<Self>> {
        store.searches_touched_on_or_before(cutoff)
    }

    fn delete(&self, store: &dyn RegistryStore) -> Result<bool> {
        match self.id {
            Some(id) => store.delete_search(id),
            None => Ok(false),
        }
    }

    fn record_key(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

/// Lifecycle sweeper over an injected store
#[derive(Clone)]
pub struct LifecycleSweeper {
    store: Arc<dyn RegistryStore>,
}

impl LifecycleSweeper {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Run one sweep as of `now`
    pub fn sweep(&self, now: NaiveDate) -> SweepReport {
        let cutoff = stale_cutoff(now);
        info!("Sweeping records touched on or before {}", cutoff);

        let mut report = SweepReport::default();

        let (searches, searches_purged) = self.sweep_records::<Search>(cutoff, now);
        report.stats.searches_purged = searches_purged;
        report.stats.searches_expiring = searches.len() - searches_purged;
        report.entries.extend(searches);

        let (players, players_purged) = self.sweep_records::<Player>(cutoff, now);
        report.stats.players_purged = players_purged;
        report.stats.players_expiring = players.len() - players_purged;
        report.entries.extend(players);

        info!(
            "Sweep finished - purged {} players and {} searches, {} entries to notify",
            report.stats.players_purged,
            report.stats.searches_purged,
            report.entries.len()
        );
        report
    }

    /// Query, delete purgeable, re-query. Returns the entries and how many
    /// of them were purged.
    fn sweep_records<T: SweepTarget>(
        &self,
        cutoff: NaiveDate,
        now: NaiveDate,
    ) -> (Vec<ExpiringEntry>, usize) {
        let store = self.store.as_ref();

        let candidates = match T::scan(store, cutoff) {
            Ok(records) => records,
            Err(e) => {
                error!("Expired record scan failed: {}", e);
                return (Vec::new(), 0);
            }
        };

        let mut purged = Vec::new();
        for record in candidates
            .iter()
            .filter(|record| record.freshness(now) == Freshness::Purgeable)
        {
            match record.delete(store) {
                Ok(true) => {
                    debug!(
                        "Purged {} '{}' of '{}'",
                        record.record_kind(),
                        record.record_key(),
                        record.owner_id()
                    );
                    purged.push(ExpiringEntry::from_record(
                        record,
                        record.record_key(),
                        now,
                        true,
                    ));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to purge {} '{}': {}",
                    record.record_kind(),
                    record.record_key(),
                    e
                ),
            }
        }

        let remaining = match T::scan(store, cutoff) {
            Ok(records) => records,
            Err(e) => {
                error!("Expired record re-scan failed: {}", e);
                Vec::new()
            }
        };

        let purged_count = purged.len();
        let mut entries = purged;
        for record in &remaining {
            let key = record.record_key();
            if entries
                .iter()
                .any(|entry| entry.kind == record.record_kind() && entry.record_key == key)
            {
                continue;
            }
            entries.push(ExpiringEntry::from_record(record, key, now, false));
        }

        (entries, purged_count)
    }
}
