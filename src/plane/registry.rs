//! Namespace registry.
//!
//! Named workers and projects share one global namespace. The registry is not
//! a table or a view: it is the pair of queries below plus the precedence rule
//! in [`pick_endpoint`]. A project and its main worker may both carry the same
//! name (they share an id); lookups then return the project entry.
//!
//! Registration serializes on a transaction-scoped advisory lock keyed by the
//! name, so two writers racing for one name cannot both pass the check. The
//! loser observes [`PlaneError::NameConflict`] once the winner commits.

use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{error::PlaneError, names};
use crate::model::{EndpointKind, EndpointRecord};

/// Fetches every entry carrying `name`, projects first.
///
/// # Errors
/// Returns the underlying `sqlx::Error` when the query fails.
pub async fn fetch_endpoints(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Vec<EndpointRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r"
        SELECT 'project' AS kind, id, NULL::uuid AS project_id
        FROM projects
        WHERE name = $1
        UNION ALL
        SELECT 'worker' AS kind, id, project_id
        FROM workers
        WHERE name = $1
        ",
    )
    .bind(name)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let kind: String = row.get("kind");
            Some(EndpointRecord {
                kind: EndpointKind::parse(&kind)?,
                id: row.get("id"),
                project_id: row.get("project_id"),
            })
        })
        .collect())
}

/// Applies the precedence rule: a project entry always wins over a worker
/// entry with the same name.
#[must_use]
pub fn pick_endpoint(
    entries: impl IntoIterator<Item = EndpointRecord>,
) -> Option<EndpointRecord> {
    let mut picked: Option<EndpointRecord> = None;
    for entry in entries {
        let replace = match picked {
            None => true,
            Some(current) => {
                current.kind == EndpointKind::Worker && entry.kind == EndpointKind::Project
            }
        };
        if replace {
            picked = Some(entry);
        }
    }
    picked
}

/// Returns the entry that blocks registering `(kind, id)` under a name, if any.
///
/// The only tolerated duplicate is a project and its main worker: same id,
/// different kinds.
#[must_use]
pub fn find_conflict(
    existing: &[EndpointRecord],
    kind: EndpointKind,
    id: Uuid,
) -> Option<EndpointRecord> {
    existing
        .iter()
        .find(|entry| !(entry.id == id && entry.kind != kind))
        .copied()
}

/// Looks up an endpoint by name using the precedence rule.
///
/// # Errors
/// Returns [`PlaneError::Database`] when the query fails.
pub async fn lookup(pool: &PgPool, name: &str) -> Result<Option<EndpointRecord>, PlaneError> {
    let mut conn = pool.acquire().await?;
    let entries = fetch_endpoints(&mut conn, &names::fold(name)).await?;
    Ok(pick_endpoint(entries))
}

/// Claims `name` for the entity `(kind, id)` inside `tx`.
///
/// Names form one space shared by every owner: they double as subdomains, so
/// a name held by any user's entity conflicts. The caller inserts or updates
/// the entity row in the same transaction; the advisory lock is held until
/// that transaction ends.
///
/// # Errors
/// Returns [`PlaneError::InvalidName`] for bad syntax and
/// [`PlaneError::NameConflict`] when another entry holds the name.
#[instrument(skip(tx))]
pub async fn register(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    kind: EndpointKind,
    id: Uuid,
) -> Result<String, PlaneError> {
    let name = names::normalize_name(name)?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("endpoint-name:{name}"))
        .execute(&mut **tx)
        .await?;

    let existing = fetch_endpoints(&mut **tx, &name).await?;
    if let Some(conflict) = find_conflict(&existing, kind, id) {
        debug!(
            conflict_kind = conflict.kind.as_str(),
            conflict_id = %conflict.id,
            "name already registered"
        );
        return Err(PlaneError::NameConflict(name));
    }

    Ok(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn worker(id: Uuid, project_id: Option<Uuid>) -> EndpointRecord {
        EndpointRecord {
            kind: EndpointKind::Worker,
            id,
            project_id,
        }
    }

    fn project(id: Uuid) -> EndpointRecord {
        EndpointRecord {
            kind: EndpointKind::Project,
            id,
            project_id: None,
        }
    }

    #[test]
    fn project_wins_over_its_main_worker_in_any_order() {
        let id = Uuid::new_v4();
        let picked = pick_endpoint([worker(id, Some(id)), project(id)]).unwrap();
        assert_eq!(picked.kind, EndpointKind::Project);

        let picked = pick_endpoint([project(id), worker(id, Some(id))]).unwrap();
        assert_eq!(picked.kind, EndpointKind::Project);
    }

    #[test]
    fn lone_worker_is_returned() {
        let id = Uuid::new_v4();
        assert_eq!(pick_endpoint([worker(id, None)]), Some(worker(id, None)));
        assert_eq!(pick_endpoint(Vec::new()), None);
    }

    #[test]
    fn main_worker_duplication_is_not_a_conflict() {
        let id = Uuid::new_v4();
        assert!(find_conflict(&[worker(id, None)], EndpointKind::Project, id).is_none());
        assert!(find_conflict(&[project(id)], EndpointKind::Worker, id).is_none());
    }

    #[test]
    fn any_other_holder_is_a_conflict() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(
            find_conflict(&[worker(other, None)], EndpointKind::Worker, id),
            Some(worker(other, None))
        );
        assert_eq!(
            find_conflict(&[project(other)], EndpointKind::Worker, id),
            Some(project(other))
        );
        // Same kind and id means the name is already claimed by that entity.
        assert!(find_conflict(&[project(id)], EndpointKind::Project, id).is_some());
    }
}
