//! Applicability rules between stored records and search criteria

use crate::types::{Player, Role, Search};

/// A role filter of `Any` accepts every record role
pub fn role_applies(record_role: Role, filter_role: Role) -> bool {
    filter_role == Role::Any || record_role == filter_role
}

/// Inclusive on both ends
pub fn sr_applies(record_sr: i32, min_sr: i32, max_sr: i32) -> bool {
    min_sr <= record_sr && record_sr <= max_sr
}

/// Whether `player` satisfies `search`; an unset target SR skips the SR check
pub fn search_applies_to_player(search: &Search, player: &Player) -> bool {
    role_applies(player.role, search.role)
        && (search.target_sr.is_none()
            || sr_applies(player.sr, search.min_sr(), search.max_sr()))
}
