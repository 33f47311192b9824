//! In-process cache of compiled route tables.
//!
//! Entries are keyed by project id and tagged with the project's
//! `routes_revision`. A lookup only hits when the caller's snapshot sees the
//! same revision, so a stale table is never served even if an explicit
//! invalidation was missed (another process may have written the routes).

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use uuid::Uuid;

use super::table::RouteTable;

#[derive(Debug, Default)]
pub struct RouteCache {
    tables: RwLock<HashMap<Uuid, Arc<RouteTable>>>,
}

impl RouteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached table for `project_id` when it was compiled at `revision`.
    #[must_use]
    pub fn get(&self, project_id: Uuid, revision: i64) -> Option<Arc<RouteTable>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(&project_id)
            .filter(|table| table.revision() == revision)
            .cloned()
    }

    /// Stores `table`, replacing any older revision. A concurrent reader that
    /// compiled an older revision never overwrites a newer one.
    pub fn insert(&self, table: RouteTable) -> Arc<RouteTable> {
        let table = Arc::new(table);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        match tables.get(&table.project_id()) {
            Some(current) if current.revision() > table.revision() => {}
            _ => {
                tables.insert(table.project_id(), Arc::clone(&table));
            }
        }
        table
    }

    /// Drops the entry for `project_id`; called after any route-set write.
    pub fn invalidate(&self, project_id: Uuid) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.remove(&project_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_requires_matching_revision() {
        let cache = RouteCache::new();
        let project_id = Uuid::new_v4();
        cache.insert(RouteTable::compile(project_id, 2, Vec::new()));

        assert!(cache.get(project_id, 2).is_some());
        assert!(cache.get(project_id, 3).is_none());
        assert!(cache.get(Uuid::new_v4(), 2).is_none());
    }

    #[test]
    fn older_revision_does_not_replace_newer() {
        let cache = RouteCache::new();
        let project_id = Uuid::new_v4();
        cache.insert(RouteTable::compile(project_id, 5, Vec::new()));
        let stale = cache.insert(RouteTable::compile(project_id, 4, Vec::new()));

        assert_eq!(stale.revision(), 4);
        assert!(cache.get(project_id, 5).is_some());
        assert!(cache.get(project_id, 4).is_none());
    }

    #[test]
    fn invalidate_drops_entry() {
        let cache = RouteCache::new();
        let project_id = Uuid::new_v4();
        cache.insert(RouteTable::compile(project_id, 1, Vec::new()));
        assert_eq!(cache.len(), 1);

        cache.invalidate(project_id);
        assert!(cache.is_empty());
    }
}
