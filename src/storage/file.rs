//! JSON file backed registry storage
//!
//! Keeps the working set in an [`InMemoryRegistryStore`] and rewrites the
//! snapshot file after every successful mutation.

use crate::error::{RegistryError, Result};
use crate::storage::memory::{InMemoryRegistryStore, StoreSnapshot};
use crate::storage::{RegistryStore, StoreCounts};
use crate::types::{Player, Role, Search, SearchId};
use anyhow::Context;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Registry storage persisted to a single JSON snapshot file
#[derive(Debug)]
pub struct FileRegistryStore {
    path: PathBuf,
    inner: InMemoryRegistryStore,
    /// Serializes snapshot writes
    write_lock: Mutex<()>,
}

impl FileRegistryStore {
    /// Open the store at `path`, loading an existing snapshot.
    ///
    /// With `reset` set, any existing snapshot is deleted and an empty one
    /// written in its place.
    pub fn open(path: impl AsRef<Path>, reset: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        if reset && path.exists() {
            warn!("Resetting registry database at {}", path.display());
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove database {}", path.display()))?;
        }

        let snapshot = if path.exists() {
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read database {}", path.display()))?;
            serde_json::from_slice::<StoreSnapshot>(&bytes).map_err(|e| {
                RegistryError::persistence(
                    "open",
                    format!("Corrupt database {}: {}", path.display(), e),
                )
            })?
        } else {
            StoreSnapshot::default()
        };

        info!(
            "Opened registry database {} ({} players, {} searches)",
            path.display(),
            snapshot.players.len(),
            snapshot.searches.len()
        );

        let store = Self {
            path,
            inner: InMemoryRegistryStore::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        };
        store.persist()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| {
            RegistryError::InternalError {
                message: "Failed to acquire database write lock".to_string(),
            }
            .into()
        })
    }

    /// Write the current contents to disk via a temporary file
    fn persist(&self) -> Result<()> {
        let _guard = self.lock_writes()?;
        self.write_snapshot(&self.inner.snapshot()?)
    }

    fn write_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let payload = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| RegistryError::persistence("serialize", e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)
            .map_err(|e| RegistryError::persistence("write", e.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| RegistryError::persistence("rename", e.to_string()))?;

        debug!("Persisted registry snapshot to {}", self.path.display());
        Ok(())
    }

    /// Apply `op` to the working set and persist the result when `changed`
    /// says so. A failed write restores the previous contents.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&InMemoryRegistryStore) -> Result<T>,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let _guard = self.lock_writes()?;
        let before = self.inner.snapshot()?;

        let outcome = op(&self.inner)?;
        if !changed(&outcome) {
            return Ok(outcome);
        }

        if let Err(e) = self.inner.snapshot().and_then(|after| self.write_snapshot(&after)) {
            warn!("Rolling back registry change: {}", e);
            self.inner.restore(before)?;
            return Err(e);
        }
        Ok(outcome)
    }
}

impl RegistryStore for FileRegistryStore {
    fn get_player(&self, user_id: &str) -> Result<Option<Player>> {
        self.inner.get_player(user_id)
    }

    fn get_or_create_player(&self, user_id: &str, today: NaiveDate) -> Result<Player> {
        if let Some(player) = self.inner.get_player(user_id)? {
            return Ok(player);
        }
        self.mutate(|inner| inner.get_or_create_player(user_id, today), |_| true)
    }

    fn upsert_player(&self, player: &Player) -> Result<()> {
        self.mutate(|inner| inner.upsert_player(player), |_| true)
    }

    fn delete_player(&self, user_id: &str) -> Result<bool> {
        self.mutate(|inner| inner.delete_player(user_id), |removed| *removed)
    }

    fn all_players(&self) -> Result<Vec<Player>> {
        self.inner.all_players()
    }

    fn players_by_role(&self, role: Role) -> Result<Vec<Player>> {
        self.inner.players_by_role(role)
    }

    fn players_by_sr_range(&self, min_sr: i32, max_sr: i32) -> Result<Vec<Player>> {
        self.inner.players_by_sr_range(min_sr, max_sr)
    }

    fn players_by_role_and_sr_range(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
    ) -> Result<Vec<Player>> {
        self.inner.players_by_role_and_sr_range(role, min_sr, max_sr)
    }

    fn players_by_role_sr_and_description(
        &self,
        role: Role,
        min_sr: i32,
        max_sr: i32,
        fragment: &str,
    ) -> Result<Vec<Player>> {
        self.inner
            .players_by_role_sr_and_description(role, min_sr, max_sr, fragment)
    }

    fn players_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Player>> {
        self.inner.players_touched_on_or_before(date)
    }

    fn create_search(&self, search: &Search) -> Result<Search> {
        self.mutate(|inner| inner.create_search(search), |_| true)
    }

    fn update_search(&self, search: &Search) -> Result<bool> {
        self.mutate(|inner| inner.update_search(search), |updated| *updated)
    }

    fn delete_search(&self, id: SearchId) -> Result<bool> {
        self.mutate(|inner| inner.delete_search(id), |removed| *removed)
    }

    fn searches_by_owner(&self, owner_id: &str) -> Result<Vec<Search>> {
        self.inner.searches_by_owner(owner_id)
    }

    fn searches_for_role(&self, role: Role) -> Result<Vec<Search>> {
        self.inner.searches_for_role(role)
    }

    fn searches_touched_on_or_before(&self, date: NaiveDate) -> Result<Vec<Search>> {
        self.inner.searches_touched_on_or_before(date)
    }

    fn counts(&self) -> Result<StoreCounts> {
        self.inner.counts()
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|inner| inner.clear(), |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("lfg-registry-{}", uuid::Uuid::new_v4()))
            .join("registry.json")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let path = temp_db_path();
        {
            let store = FileRegistryStore::open(&path, false).unwrap();
            let mut player = store.get_or_create_player("alice", today()).unwrap();
            player.role = Role::Flex;
            player.sr = 3100;
            store.upsert_player(&player).unwrap();

            let mut search = Search::new("alice", today());
            search.role = Role::Tank;
            store.create_search(&search).unwrap();
        }

        let reopened = FileRegistryStore::open(&path, false).unwrap();
        let player = reopened.get_player("alice").unwrap().unwrap();
        assert_eq!(player.role, Role::Flex);
        assert_eq!(player.sr, 3100);

        // Search ids keep counting after a reload
        let searches = reopened.searches_by_owner("alice").unwrap();
        assert_eq!(searches.len(), 1);
        let next = reopened
            .create_search(&Search::new("bob", today()))
            .unwrap();
        assert_ne!(next.id, searches[0].id);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_reset_wipes_existing_data() {
        let path = temp_db_path();
        {
            let store = FileRegistryStore::open(&path, false).unwrap();
            store.get_or_create_player("alice", today()).unwrap();
        }

        let reset = FileRegistryStore::open(&path, true).unwrap();
        assert_eq!(reset.counts().unwrap(), StoreCounts::default());
        assert!(reset.path().exists());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let path = temp_db_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        assert!(FileRegistryStore::open(&path, false).is_err());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_failed_write_leaves_working_set_unchanged() {
        let path = temp_db_path();
        let store = FileRegistryStore::open(&path, false).unwrap();
        let mut player = store.get_or_create_player("alice", today()).unwrap();
        let search = store
            .create_search(&Search::new("alice", today()))
            .unwrap();

        // A directory in place of the temporary file makes every write fail
        fs::create_dir_all(path.with_extension("json.tmp")).unwrap();

        assert!(store.create_search(&Search::new("alice", today())).is_err());
        assert_eq!(store.searches_by_owner("alice").unwrap(), vec![search.clone()]);

        player.sr = 4000;
        assert!(store.upsert_player(&player).is_err());
        assert_eq!(store.get_player("alice").unwrap().unwrap().sr, 0);

        assert!(store.delete_search(search.id.unwrap()).is_err());
        assert!(store.delete_player("alice").is_err());
        assert!(store.get_or_create_player("bob", today()).is_err());
        assert_eq!(
            store.counts().unwrap(),
            StoreCounts {
                players: 1,
                searches: 1
            }
        );

        // Disk and memory still agree
        fs::remove_dir_all(path.with_extension("json.tmp")).unwrap();
        drop(store);
        let reopened = FileRegistryStore::open(&path, false).unwrap();
        assert_eq!(reopened.searches_by_owner("alice").unwrap(), vec![search]);
        assert_eq!(reopened.get_player("alice").unwrap().unwrap().sr, 0);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
