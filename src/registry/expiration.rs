//! Expiration policy shared by players and searches
//!
//! Freshness is recomputed on every evaluation from the last-touched date and
//! "now"; it is never stored.

use crate::types::{Player, Search, UserId};
use crate::utils::days_between;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Age in days at which a record becomes stale and its owner is warned
pub const STALE_AFTER_DAYS: u64 = 7;

/// Age in days at which a record may be deleted
pub const PURGE_AFTER_DAYS: u64 = 10;

/// Three-valued freshness of an expirable record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Freshness {
    Fresh,
    Stale,
    Purgeable,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Purgeable => write!(f, "purgeable"),
        }
    }
}

/// Classify a record touched on `last_touched` as seen on `now`.
///
/// Ages of 7, 8 and 9 days are stale; 10 days and older are purgeable.
pub fn classify(last_touched: NaiveDate, now: NaiveDate) -> Freshness {
    let age = days_between(last_touched, now);
    if age >= PURGE_AFTER_DAYS as i64 {
        Freshness::Purgeable
    } else if age >= STALE_AFTER_DAYS as i64 {
        Freshness::Stale
    } else {
        Freshness::Fresh
    }
}

/// Latest last-touched date that counts as at least stale on `now`
pub fn stale_cutoff(now: NaiveDate) -> NaiveDate {
    now.checked_sub_days(Days::new(STALE_AFTER_DAYS))
        .unwrap_or(NaiveDate::MIN)
}

/// Kind of record an expiring entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Player,
    Search,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Player => write!(f, "Player"),
            RecordKind::Search => write!(f, "Search"),
        }
    }
}

/// Records that age out of the registry when left untouched
pub trait Expirable {
    /// User the record belongs to
    fn owner_id(&self) -> &UserId;

    fn last_touched(&self) -> NaiveDate;

    fn record_kind(&self) -> RecordKind;

    fn freshness(&self, now: NaiveDate) -> Freshness {
        classify(self.last_touched(), now)
    }
}

impl Expirable for Player {
    fn owner_id(&self) -> &UserId {
        &self.user_id
    }

    fn last_touched(&self) -> NaiveDate {
        self.last_touched
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Player
    }
}

impl Expirable for Search {
    fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    fn last_touched(&self) -> NaiveDate {
        self.last_touched
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Search
    }
}
