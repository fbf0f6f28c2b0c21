//! Matching players to searches and searches to players
//!
//! Both directions are read-only: persistence failures are logged and yield
//! an empty result instead of an error.

use crate::registry::range::search_applies_to_player;
use crate::storage::RegistryStore;
use crate::types::{Player, Role, Search};
use std::sync::Arc;
use tracing::{debug, error};

/// Store scan used to answer a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerQuery {
    All,
    ByRole(Role),
    BySrRange { min_sr: i32, max_sr: i32 },
    ByRoleAndSrRange { role: Role, min_sr: i32, max_sr: i32 },
}

impl PlayerQuery {
    /// Pick the narrowest scan for `search`.
    ///
    /// An unset target SR is treated as the normalized full-range window and
    /// drops the SR condition from the scan; a wildcard role drops the role
    /// condition.
    pub fn for_search(search: &Search) -> Self {
        let mut normalized = search.clone();
        normalized.normalize();

        match (search.role, search.target_sr) {
            (Role::Any, None) => PlayerQuery::All,
            (role, None) => PlayerQuery::ByRole(role),
            (Role::Any, Some(_)) => PlayerQuery::BySrRange {
                min_sr: normalized.min_sr(),
                max_sr: normalized.max_sr(),
            },
            (role, Some(_)) => PlayerQuery::ByRoleAndSrRange {
                role,
                min_sr: normalized.min_sr(),
                max_sr: normalized.max_sr(),
            },
        }
    }

    fn execute(&self, store: &dyn RegistryStore) -> crate::error::Result<Vec<Player>> {
        match *self {
            PlayerQuery::All => store.all_players(),
            PlayerQuery::ByRole(role) => store.players_by_role(role),
            PlayerQuery::BySrRange { min_sr, max_sr } => store.players_by_sr_range(min_sr, max_sr),
            PlayerQuery::ByRoleAndSrRange {
                role,
                min_sr,
                max_sr,
            } => store.players_by_role_and_sr_range(role, min_sr, max_sr),
        }
    }
}

/// Matching engine over an injected store
#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn RegistryStore>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn RegistryStore> {
        self.store.clone()
    }

    /// Every stored player satisfying `search`
    pub fn find_players(&self, search: &Search) -> Vec<Player> {
        let query = PlayerQuery::for_search(search);
        debug!("Finding players for search of '{}' with {:?}", search.owner_id, query);

        match query.execute(self.store.as_ref()) {
            Ok(players) => players,
            Err(e) => {
                error!(
                    "Player lookup failed for search of '{}': {}",
                    search.owner_id, e
                );
                Vec::new()
            }
        }
    }

    /// Every stored search that `player` satisfies
    pub fn find_searches(&self, player: &Player) -> Vec<Search> {
        match self.store.searches_for_role(player.role) {
            Ok(searches) => searches
                .into_iter()
                .filter(|search| search_applies_to_player(search, player))
                .collect(),
            Err(e) => {
                error!("Search lookup failed for player '{}': {}", player.user_id, e);
                Vec::new()
            }
        }
    }
}
