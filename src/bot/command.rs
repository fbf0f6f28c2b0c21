//! Direct message command routing
//!
//! A line is routed by its first whitespace-separated token. Profile values are
//! validated here, before any stored state is touched.

use crate::error::Rejection;
use crate::types::Role;

/// Reply to lines that are not commands
pub const NOT_A_COMMAND_REPLY: &str = "Try !help";

/// `!search` is matched as a prefix, so `!search-role tank` is a search
const SEARCH_PREFIX: &str = "!search";

/// Command family, used for routing and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Search,
    Update,
    Delete,
    Help,
    Sr,
    Role,
    Description,
    Unknown,
    NotACommand,
}

impl CommandKind {
    /// Route a raw line by its first token
    pub fn route(text: &str) -> Self {
        match text.split_whitespace().next() {
            Some(token) if token.starts_with(SEARCH_PREFIX) => CommandKind::Search,
            Some("!update") => CommandKind::Update,
            Some("!delete") => CommandKind::Delete,
            Some("!help") => CommandKind::Help,
            Some("!sr") => CommandKind::Sr,
            Some("!role") => CommandKind::Role,
            Some("!description") => CommandKind::Description,
            Some(token) if token.starts_with('!') => CommandKind::Unknown,
            _ => CommandKind::NotACommand,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Search => "search",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Help => "help",
            CommandKind::Sr => "sr",
            CommandKind::Role => "role",
            CommandKind::Description => "description",
            CommandKind::Unknown => "unknown",
            CommandKind::NotACommand => "none",
        }
    }
}

/// Validated change to a player profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    Sr(i32),
    Role(Role),
    Description(String),
}

/// A parsed direct message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!search` with its (unparsed) directive
    Search { directive: String },
    /// `!update`: refresh the sender's records
    Update,
    /// `!delete`: remove the sender's profile and searches
    Delete,
    Help,
    Profile(ProfileUpdate),
    /// Plain text without a leading command
    NotACommand,
}

impl Command {
    /// Parse a direct message.
    ///
    /// `!search` directives are only split off here; their flags are
    /// validated by the registry when the search is built.
    pub fn parse(text: &str) -> Result<Command, Rejection> {
        let text = text.trim();
        let (token, rest) = match text.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (text, ""),
        };

        match CommandKind::route(text) {
            CommandKind::Search => Ok(Command::Search {
                directive: text
                    .strip_prefix(SEARCH_PREFIX)
                    .map(str::trim)
                    .unwrap_or(rest)
                    .to_string(),
            }),
            CommandKind::Update => Ok(Command::Update),
            CommandKind::Delete => Ok(Command::Delete),
            CommandKind::Help => Ok(Command::Help),
            CommandKind::Sr => parse_sr(required_value("sr", rest)?).map(Command::Profile),
            CommandKind::Role => parse_role(required_value("role", rest)?).map(Command::Profile),
            CommandKind::Description => Ok(Command::Profile(ProfileUpdate::Description(
                required_value("description", rest)?.to_string(),
            ))),
            CommandKind::Unknown => Err(Rejection::UnknownCommand(token.to_string())),
            CommandKind::NotACommand => Ok(Command::NotACommand),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Search { .. } => CommandKind::Search,
            Command::Update => CommandKind::Update,
            Command::Delete => CommandKind::Delete,
            Command::Help => CommandKind::Help,
            Command::Profile(ProfileUpdate::Sr(_)) => CommandKind::Sr,
            Command::Profile(ProfileUpdate::Role(_)) => CommandKind::Role,
            Command::Profile(ProfileUpdate::Description(_)) => CommandKind::Description,
            Command::NotACommand => CommandKind::NotACommand,
        }
    }
}

fn required_value<'a>(command: &'static str, value: &'a str) -> Result<&'a str, Rejection> {
    if value.is_empty() {
        Err(Rejection::MissingProfileValue { command })
    } else {
        Ok(value)
    }
}

/// Profile SR must lie strictly between 0 and 5000
fn parse_sr(value: &str) -> Result<ProfileUpdate, Rejection> {
    value
        .parse::<i32>()
        .ok()
        .filter(|sr| *sr > 0 && *sr < 5000)
        .map(ProfileUpdate::Sr)
        .ok_or_else(|| Rejection::InvalidProfileSr(value.to_string()))
}

fn parse_role(value: &str) -> Result<ProfileUpdate, Rejection> {
    Role::from_identifier(value)
        .map(ProfileUpdate::Role)
        .ok_or_else(|| Rejection::UnknownProfileRole(value.to_lowercase()))
}

/// Text sent in reply to `!help`
pub fn help_text() -> String {
    [
        "***Profile***",
        "`!sr <1-4999>` *set your skill rating*",
        "`!role <tank|dps|support|flex>` *set your role*",
        "`!description <text>` *describe yourself*",
        "`!update` *keep your profile and searches from expiring*",
        "`!delete` *delete your profile and all of your searches*",
        "",
        "***Search***",
        "`!search [-role <role>] [-sr <0-5000>] [-range <n>] [-notify | -delete]`",
        "*`-notify` stores the search and messages you when a matching player shows up,*",
        "*`-delete` removes all of your stored searches.*",
        "",
        "*Entries untouched for 7 days expire and are deleted after 10.*",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_by_first_token() {
        assert_eq!(CommandKind::route("!search -role tank"), CommandKind::Search);
        assert_eq!(CommandKind::route("!update"), CommandKind::Update);
        assert_eq!(CommandKind::route("  !help  "), CommandKind::Help);
        assert_eq!(CommandKind::route("!searching"), CommandKind::Unknown);
        assert_eq!(CommandKind::route("hello there"), CommandKind::NotACommand);
        assert_eq!(CommandKind::route(""), CommandKind::NotACommand);
    }

    #[test]
    fn test_search_directive_is_passed_through() {
        assert_eq!(
            Command::parse("!search role tank -sr 2500").unwrap(),
            Command::Search {
                directive: "role tank -sr 2500".to_string()
            }
        );
        assert_eq!(
            Command::parse("!search").unwrap(),
            Command::Search {
                directive: String::new()
            }
        );
    }

    #[test]
    fn test_search_prefix_without_space() {
        assert_eq!(CommandKind::route("!search-role tank"), CommandKind::Search);
        assert_eq!(
            Command::parse("!search-role tank -notify").unwrap(),
            Command::Search {
                directive: "-role tank -notify".to_string()
            }
        );
    }

    #[test]
    fn test_profile_sr_bounds_are_exclusive() {
        assert_eq!(
            Command::parse("!sr 1").unwrap(),
            Command::Profile(ProfileUpdate::Sr(1))
        );
        assert_eq!(
            Command::parse("!sr 4999").unwrap(),
            Command::Profile(ProfileUpdate::Sr(4999))
        );
        for value in ["0", "5000", "6000", "-5", "abc"] {
            assert_eq!(
                Command::parse(&format!("!sr {}", value)).unwrap_err(),
                Rejection::InvalidProfileSr(value.to_string())
            );
        }
    }

    #[test]
    fn test_profile_role() {
        assert_eq!(
            Command::parse("!role SUPPORT").unwrap(),
            Command::Profile(ProfileUpdate::Role(Role::Support))
        );
        assert_eq!(
            Command::parse("!role Any").unwrap_err(),
            Rejection::UnknownProfileRole("any".to_string())
        );
        assert_eq!(
            Command::parse("!role none").unwrap_err(),
            Rejection::UnknownProfileRole("none".to_string())
        );
    }

    #[test]
    fn test_description_keeps_whole_text() {
        assert_eq!(
            Command::parse("!description Flex player, EU, evenings").unwrap(),
            Command::Profile(ProfileUpdate::Description(
                "Flex player, EU, evenings".to_string()
            ))
        );
    }

    #[test]
    fn test_missing_profile_value() {
        assert_eq!(
            Command::parse("!sr").unwrap_err(),
            Rejection::MissingProfileValue { command: "sr" }
        );
        assert_eq!(
            Command::parse("!description   ").unwrap_err(),
            Rejection::MissingProfileValue {
                command: "description"
            }
        );
    }

    #[test]
    fn test_unknown_command_names_the_verb() {
        let rejection = Command::parse("!dance now").unwrap_err();
        assert_eq!(rejection, Rejection::UnknownCommand("!dance".to_string()));
        assert_eq!(rejection.to_string(), "*Unknown command:* !dance");
    }

    #[test]
    fn test_kind_matches_route() {
        for line in ["!search", "!update", "!delete", "!help", "!sr 100", "!role dps", "hi"] {
            assert_eq!(Command::parse(line).unwrap().kind(), CommandKind::route(line));
        }
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for command in ["!sr", "!role", "!description", "!update", "!delete", "!search"] {
            assert!(help.contains(command), "help is missing {}", command);
        }
    }
}
