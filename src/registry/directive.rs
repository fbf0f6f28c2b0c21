//! Search directive parsing
//!
//! A directive is the argument text of `!search`: flags separated by `-`,
//! e.g. `role tank -sr 2500 -range 200 -notify`. Parsing is fail-fast from
//! left to right and yields either a validated [`SearchDirective`] or the
//! first [`Rejection`] encountered.

use crate::error::Rejection;
use crate::types::{Role, Search, MAX_SR, MIN_SR};
use chrono::NaiveDate;

/// What to do with the search besides matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAction {
    /// List matches only
    Match,
    /// List matches, then persist the search for notifications
    Notify,
    /// Delete every stored search of the owner; no matching
    Delete,
}

/// Validated search command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDirective {
    pub search: Search,
    pub action: SearchAction,
}

/// Parse `directive` into a search owned by `owner_id`
pub fn validate_and_build_search(
    owner_id: &str,
    directive: &str,
    today: NaiveDate,
) -> Result<SearchDirective, Rejection> {
    let mut search = Search::new(owner_id, today);
    let mut notify = false;
    let mut delete = false;

    for part in directive.split('-') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (flag, operand) = match part.split_once(char::is_whitespace) {
            Some((flag, operand)) => (flag, Some(operand.trim())),
            None => (part, None),
        };

        match flag {
            "role" => {
                let operand = operand.ok_or(Rejection::MissingFlagOperand {
                    flag: "role",
                    expected: "a role",
                })?;
                search.role = Role::from_identifier(operand)
                    .ok_or_else(|| Rejection::InvalidSearchRole(operand.to_string()))?;
            }
            "sr" => {
                let operand = operand.ok_or(Rejection::MissingFlagOperand {
                    flag: "sr",
                    expected: "a number between* 0 *and* 5000",
                })?;
                let sr = operand
                    .parse::<i32>()
                    .ok()
                    .filter(|sr| (MIN_SR..=MAX_SR).contains(sr))
                    .ok_or_else(|| Rejection::InvalidSearchSr(operand.to_string()))?;
                search.target_sr = Some(sr);
            }
            "range" => {
                let operand = operand.ok_or(Rejection::MissingFlagOperand {
                    flag: "range",
                    expected: "a number",
                })?;
                search.range = operand
                    .parse::<i32>()
                    .map_err(|_| Rejection::InvalidRange(operand.to_string()))?;
            }
            "delete" => {
                if notify {
                    return Err(Rejection::ExclusiveFlags);
                }
                delete = true;
            }
            "notify" => {
                if delete {
                    return Err(Rejection::ExclusiveFlags);
                }
                notify = true;
            }
            unknown => return Err(Rejection::UnknownFlag(unknown.to_string())),
        }
    }

    let action = if delete {
        SearchAction::Delete
    } else if notify {
        SearchAction::Notify
    } else {
        SearchAction::Match
    };

    Ok(SearchDirective { search, action })
}
