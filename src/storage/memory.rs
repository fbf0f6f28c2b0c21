//! In-memory registry storage

use crate::error::{RegistryError, Result};
use crate::registry::range::sr_applies;
use crate::storage::{RegistryStore, StoreCounts};
use crate::types::{Player, Role, Search, SearchId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Complete contents of a store, as persisted by the file-backed store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub players: HashMap<UserId, Player>,
    pub searches: BTreeMap<SearchId, Search>,
    pub next_search_id: SearchId,
}

/// In-memory registry storage implementation
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    state: RwLock<StoreSnapshot>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.read()?.clone())
    }

    /// Replace the current contents with `snapshot`
    pub fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        *self.write()? = snapshot;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreSnapshot>> {
        self.state.read().map_err(|_| {
            RegistryError::InternalError {
                message: "Failed to acquire registry read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreSnapshot>> {
        self.state.write().map_err(|_| {
            RegistryError::InternalError {
                message: "Failed to acquire registry write lock".to_string(),
            }
            .into()
        })
    }

    /// Players passing `filter`, ordered by user id
    fn select_players<F>(&self, filter: F) -> Result<Vec<Player>>
    where
        F: Fn(&Player) -> bool,
    {
        let state = self.read()?;
        let mut players: Vec<Player> = state
            .players
            .values()
            .filter(|player| filter(player))
            .cloned()
            .collect();
        players.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(players)
    }

    /// Searches passing `filter`, ordered by id
    fn select_searches<F>(&self, filter: F) -> Result<Vec<Search>>
    where
        F: Fn(&Search) -> bool,
    {
        let state = self.read()?;
        Ok(state
            .searches
            .values()
            .filter(|search| filter(search))
            .cloned()
            .collect())
    }
}

impl RegistryStore for InMemoryRegistryStore {
    fn get_player(&self, user_id: &str) -> Result<Option<Player>> {
        Ok(self.read()?.players.get(user_id).cloned())
    }

    fn get_or_create_player(&self, user_id: &str, today: NaiveDate) -> Result<Player> {
        let mut state = self.write()?;
        let player = state
            .players
            .entry(user_id.to_string())
            .or_insert_with(|| Player::new(user_id, today));
        Ok(player.clone())
    }

    fn upsert_player(&self, player: &Player) -> Result<()> {
        let mut state = self.write()?;
        state
            .players
            .insert(player.user_id.clone(), player.clone());
        Ok(())
    }

    fn delete_player(&self, user_id: &str) -> Result<bool> {
        Ok(self.write()?.players.remove(user_id).is_some())
    }

    fn all_players(&self) -> Result<Vec<Player>> {
        self.select_players(|_| true)
    }

    fn players_by_role(&self, role: Role) -> Result<Vec<Player>> {
        self.select_players(|player| player.role == role)
    }

    fn players_by_sr_range(&self, min_sr: i32, max_sr: i32) -> Result<Vec<Player>> {
        self.select_players(|player| sr_applies(player.sr, min_sr, max_sr))
    }

    fn players_by_role_and_sr_range(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
    ) -> Result<Vec<Player>> {
        self.select_players(|player| player.role == role && sr_applies(player.sr, min_sr, max_sr))
    }

    fn players_by_role_sr_and_description(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
        fragment: &str,
    ) -> Result<Vec<Player>> {
        let needle = fragment.to_lowercase();
        self.select_players(|player| {
            player.role == role
                && sr_applies(player.sr, min_sr, max_sr)
                && player
                    .description
                    .as_ref()
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
        })
    }

    fn players_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Player>> {
        self.select_players(|player| player.last_touched <= date)
    }

    fn create_search(&self, search: &Search) -> Result<Search> {
        let mut state = self.write()?;
        state.next_search_id += 1;
        let id = state.next_search_id;

        let mut stored = search.clone();
        stored.id = Some(id);
        state.searches.insert(id, stored.clone());
        Ok(stored)
    }

    fn update_search(&self, search: &Search) -> Result<bool> {
        let Some(id) = search.id else {
            return Ok(false);
        };

        let mut state = self.write()?;
        match state.searches.get_mut(&id) {
            Some(stored) => {
                *stored = search.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_search(&self, id: SearchId) -> Result<bool> {
        Ok(self.write()?.searches.remove(&id).is_some())
    }

    fn searches_by_owner(&self, owner_id: &str) -> Result<Vec<Search>> {
        self.select_searches(|search| search.owner_id == owner_id)
    }

    fn searches_for_role(&self, role: Role) -> Result<Vec<Search>> {
        self.select_searches(|search| search.role == role || search.role == Role::Any)
    }

    fn searches_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Search>> {
        self.select_searches(|search| search.last_touched <= date)
    }

    fn counts(&self) -> Result<StoreCounts> {
        let state = self.read()?;
        Ok(StoreCounts {
            players: state.players.len(),
            searches: state.searches.len(),
        })
    }

    fn clear(&self) -> Result<()> {
        *self.write()? = StoreSnapshot::default();
        Ok(())
    }
}
