//! Persistence for player profiles and saved searches
//!
//! The registry talks to storage only through [`RegistryStore`], a set of
//! typed keyed operations and filtered scans over the two record sets.

pub mod file;
pub mod memory;

pub use file::FileRegistryStore;
pub use memory::{InMemoryRegistryStore, StoreSnapshot};

use crate::error::Result;
use crate::types::{Player, Role, Search, SearchId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of stored records per set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub players: usize,
    pub searches: usize,
}

/// Trait for registry storage operations
#[cfg_attr(test, mockall::automock)]
pub trait RegistryStore: Send + Sync {
    /// Get a player's profile
    fn get_player(&self, user_id: &str) -> Result<Option<Player>>;

    /// Get a player's profile, creating an unset one touched `today` if absent
    fn get_or_create_player(&self, user_id: &str, today: NaiveDate) -> Result<Player>;

    /// Create or replace a player's profile
    fn upsert_player(&self, player: &Player) -> Result<()>;

    /// Remove a player's profile, returning whether it existed
    fn delete_player(&self, user_id: &str) -> Result<bool>;

    fn all_players(&self) -> Result<Vec<Player>>;

    fn players_by_role(&self, role: Role) -> Result<Vec<Player>>;

    /// Players whose SR lies in `[min_sr, max_sr]`
    fn players_by_sr_range(&self, min_sr: i32, max_sr: i32) -> Result<Vec<Player>>;

    fn players_by_role_and_sr_range(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
    ) -> Result<Vec<Player>>;

    /// Role and SR range plus a case-insensitive description substring
    fn players_by_role_sr_and_description(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
        fragment: &str,
    ) -> Result<Vec<Player>>;

    fn players_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Player>>;

    /// Persist a new search and return it with its assigned id
    fn create_search(&self, search: &Search) -> Result<Search>;

    /// Replace a stored search by id, returning whether it existed
    fn update_search(&self, search: &Search) -> Result<bool>;

    fn delete_search(&self, id: SearchId) -> Result<bool>;

    fn searches_by_owner(&self, owner_id: &str) -> Result<Vec<Search>>;

    /// Searches filtering on exactly `role` or on the wildcard role
    fn searches_for_role(&self, role: Role) -> Result<Vec<Search>>;

    fn searches_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Search>>;

    fn counts(&self) -> Result<StoreCounts>;

    /// Drop every record
    fn clear(&self) -> Result<()>;
}
