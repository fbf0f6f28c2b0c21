//! Common types used throughout the registry

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque chat user identifier, stable across updates
pub type UserId = String;

/// Store-assigned search record identifier
pub type SearchId = u64;

/// Smallest SR a search window may be centered on
pub const MIN_SR: i32 = 0;

/// Largest SR a search window may be centered on
pub const MAX_SR: i32 = 5000;

/// Tolerance applied when a search does not specify `-range`
pub const DEFAULT_SEARCH_RANGE: i32 = 300;

/// Player role; `Any` is search-only and `None` is the unset profile value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tank,
    Dps,
    Support,
    Flex,
    Any,
    None,
}

impl Role {
    /// Roles a user may pick for a profile or a search filter
    pub const SELECTABLE: [Role; 4] = [Role::Tank, Role::Dps, Role::Support, Role::Flex];

    /// Resolve a user-supplied identifier, case-insensitive.
    ///
    /// Only the four concrete roles resolve: `any` and `none` are never
    /// accepted from user input.
    pub fn from_identifier(identifier: &str) -> Option<Role> {
        match identifier.to_lowercase().as_str() {
            "tank" => Some(Role::Tank),
            "dps" => Some(Role::Dps),
            "support" => Some(Role::Support),
            "flex" => Some(Role::Flex),
            _ => None,
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            Role::Tank => "tank",
            Role::Dps => "dps",
            Role::Support => "support",
            Role::Flex => "flex",
            Role::Any => "any",
            Role::None => "none",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Registered player profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: UserId,
    pub role: Role,
    /// Zero until the user sets it
    pub sr: i32,
    pub description: Option<String>,
    pub last_touched: NaiveDate,
}

impl Player {
    /// Fresh profile: role unset, SR unset
    pub fn new(user_id: impl Into<UserId>, today: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::None,
            sr: 0,
            description: None,
            last_touched: today,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "***Name:*** <@{}>\n***SR:*** {}\n***Role:*** {}",
            self.user_id,
            self.sr,
            self.role.identifier().to_uppercase()
        )
    }
}

/// Stored or in-flight search for teammates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    /// Assigned by the store on creation
    pub id: Option<SearchId>,
    pub owner_id: UserId,
    pub role: Role,
    /// `None` means SR is ignored
    pub target_sr: Option<i32>,
    pub range: i32,
    pub last_touched: NaiveDate,
}

impl Search {
    pub fn new(owner_id: impl Into<UserId>, today: NaiveDate) -> Self {
        Self {
            id: None,
            owner_id: owner_id.into(),
            role: Role::Any,
            target_sr: None,
            range: DEFAULT_SEARCH_RANGE,
            last_touched: today,
        }
    }

    /// Replace an unset target with the full-range window (target 0, range 5000)
    pub fn normalize(&mut self) {
        if self.target_sr.is_none() {
            self.target_sr = Some(0);
            self.range = MAX_SR;
        }
    }

    /// Lower window bound, clamped to the `i32` domain
    pub fn min_sr(&self) -> i32 {
        self.target_sr.unwrap_or(0).saturating_sub(self.range)
    }

    pub fn max_sr(&self) -> i32 {
        self.target_sr.unwrap_or(0).saturating_add(self.range)
    }
}

impl fmt::Display for Search {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "***Role: ***{}\n***SR: ***{} - {}",
            self.role,
            self.min_sr(),
            self.max_sr()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_role_lookup_is_case_insensitive() {
        assert_eq!(Role::from_identifier("TaNk"), Some(Role::Tank));
        assert_eq!(Role::from_identifier("DPS"), Some(Role::Dps));
        assert_eq!(Role::from_identifier("support"), Some(Role::Support));
        assert_eq!(Role::from_identifier("Flex"), Some(Role::Flex));
    }

    #[test]
    fn test_role_lookup_rejects_wildcard_and_unset() {
        assert_eq!(Role::from_identifier("any"), None);
        assert_eq!(Role::from_identifier("none"), None);
        assert_eq!(Role::from_identifier(""), None);
        assert_eq!(Role::from_identifier("healer"), None);
    }

    #[test]
    fn test_new_player_is_unset() {
        let player = Player::new("42", today());
        assert_eq!(player.role, Role::None);
        assert_eq!(player.sr, 0);
        assert!(player.description.is_none());
    }

    #[test]
    fn test_player_display() {
        let mut player = Player::new("42", today());
        player.role = Role::Support;
        player.sr = 2750;
        assert_eq!(
            player.to_string(),
            "***Name:*** <@42>\n***SR:*** 2750\n***Role:*** SUPPORT"
        );
    }

    #[test]
    fn test_search_window() {
        let mut search = Search::new("7", today());
        search.target_sr = Some(2500);
        assert_eq!(search.min_sr(), 2200);
        assert_eq!(search.max_sr(), 2800);
        assert_eq!(search.to_string(), "***Role: ***any\n***SR: ***2200 - 2800");
    }

    #[test]
    fn test_extreme_ranges_clamp_instead_of_overflowing() {
        let mut wide = Search::new("7", today());
        wide.target_sr = Some(2500);
        wide.range = i32::MAX;
        assert_eq!(wide.min_sr(), 2500 - i32::MAX);
        assert_eq!(wide.max_sr(), i32::MAX);

        // A negative range yields an empty window
        let mut inverted = wide.clone();
        inverted.range = i32::MIN;
        assert_eq!(inverted.min_sr(), i32::MAX);
        assert!(inverted.max_sr() < inverted.min_sr());
    }

    #[test]
    fn test_normalize_only_touches_unset_target() {
        let mut unset = Search::new("7", today());
        unset.normalize();
        assert_eq!(unset.target_sr, Some(0));
        assert_eq!(unset.range, 5000);

        let mut set = Search::new("7", today());
        set.target_sr = Some(1800);
        set.normalize();
        assert_eq!(set.target_sr, Some(1800));
        assert_eq!(set.range, DEFAULT_SEARCH_RANGE);
    }
}
