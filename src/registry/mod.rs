//! Registry core: matching, search directives and record expiration

pub mod directive;
pub mod expiration;
pub mod matching;
pub mod range;
pub mod sweeper;

pub use directive::{validate_and_build_search, SearchAction, SearchDirective};
pub use expiration::{classify, Expirable, Freshness, RecordKind};
pub use matching::{MatchingEngine, PlayerQuery};
pub use sweeper::{ExpiringEntry, LifecycleSweeper, SweepReport, SweepStats};
