//! Per-project route table and best-route selection.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use super::pattern::Pattern;
use crate::model::{RouteBackend, RouteRecord};

/// How to settle two matching routes with equal specificity and priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The lexicographically smallest pattern wins.
    #[default]
    Lexical,
    /// The request fails with [`AmbiguousRoute`].
    Reject,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown tie-break policy: {other}")),
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => f.write_str("lexical"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Worker(Uuid),
    Storage,
}

#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pattern: Pattern,
    priority: i32,
    specificity: i64,
    target: RouteTarget,
}

impl CompiledRoute {
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn specificity(&self) -> i64 {
        self.specificity
    }

    #[must_use]
    pub fn target(&self) -> RouteTarget {
        self.target
    }

    fn same_rank(&self, other: &Self) -> bool {
        self.specificity == other.specificity && self.priority == other.priority
    }
}

/// Two or more routes matched with identical specificity and priority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ambiguous route for path: {patterns:?}")]
pub struct AmbiguousRoute {
    pub patterns: Vec<String>,
}

/// Compiled routes of one project at one route-set revision.
///
/// Routes are kept sorted by specificity (desc), priority (desc), then
/// pattern (asc), so the first match is the winner under
/// [`TieBreak::Lexical`].
#[derive(Debug, Clone)]
pub struct RouteTable {
    project_id: Uuid,
    revision: i64,
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compiles stored routes. Rows that cannot be compiled are skipped with a
    /// warning; writes validate patterns, so this only happens on manual edits.
    #[must_use]
    pub fn compile(project_id: Uuid, revision: i64, records: Vec<RouteRecord>) -> Self {
        let mut routes: Vec<CompiledRoute> = records
            .into_iter()
            .filter_map(|record| {
                let target = match (record.backend, record.worker_id) {
                    (RouteBackend::Worker, Some(worker_id)) => RouteTarget::Worker(worker_id),
                    (RouteBackend::Storage, _) => RouteTarget::Storage,
                    (RouteBackend::Worker, None) => {
                        warn!(
                            %project_id,
                            pattern = %record.pattern,
                            "worker route without worker, skipped"
                        );
                        return None;
                    }
                };
                match Pattern::parse(&record.pattern) {
                    Ok(pattern) => Some(CompiledRoute {
                        specificity: pattern.specificity(),
                        pattern,
                        priority: record.priority,
                        target,
                    }),
                    Err(err) => {
                        warn!(
                            %project_id,
                            pattern = %record.pattern,
                            "invalid stored route: {err}"
                        );
                        None
                    }
                }
            })
            .collect();

        routes.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.pattern().cmp(b.pattern()))
        });

        Self {
            project_id,
            revision,
            routes,
        }
    }

    #[must_use]
    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    #[must_use]
    pub fn revision(&self) -> i64 {
        self.revision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Picks the route serving `path`, or `None` when nothing matches.
    ///
    /// # Errors
    /// Returns [`AmbiguousRoute`] under [`TieBreak::Reject`] when the best
    /// match shares specificity and priority with another match.
    pub fn select(
        &self,
        path: &str,
        tie_break: TieBreak,
    ) -> Result<Option<&CompiledRoute>, AmbiguousRoute> {
        let mut matching = self.routes.iter().filter(|route| route.pattern.matches(path));
        let Some(best) = matching.next() else {
            return Ok(None);
        };

        if tie_break == TieBreak::Reject {
            let rivals: Vec<String> = matching
                .take_while(|route| route.same_rank(best))
                .map(|route| route.pattern().to_string())
                .collect();
            if !rivals.is_empty() {
                let mut patterns = vec![best.pattern().to_string()];
                patterns.extend(rivals);
                return Err(AmbiguousRoute { patterns });
            }
        }

        Ok(Some(best))
    }
}
