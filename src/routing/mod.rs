//! Route table and pattern matcher.
//!
//! Each project owns an ordered set of path patterns resolving to a worker or
//! to the project's storage. Patterns are compiled once per route-set revision
//! and cached; selection picks the most specific match, then the highest
//! explicit priority, then applies the configured [`TieBreak`].

mod cache;
mod pattern;
mod table;

pub use cache::RouteCache;
pub use pattern::{Pattern, PatternError};
pub use table::{AmbiguousRoute, CompiledRoute, RouteTable, RouteTarget, TieBreak};
