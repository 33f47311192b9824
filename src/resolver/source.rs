//! Read access used by the resolver.
//!
//! Production reads go through [`PgSnapshot`], a read-only `REPEATABLE READ`
//! transaction: identity lookup, route selection and the binding lookup all
//! see the same committed state, and none of them takes row locks.

use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    model::{
        ASSETS_KEY, BindingRecord, BindingType, EndpointKind, EndpointRecord, RouteBackend,
        RouteRecord,
    },
    plane::registry,
};

/// The reads one resolution needs. Implementations must answer every call from
/// the same consistent view of the data.
#[allow(async_fn_in_trait)]
pub trait EndpointSource {
    async fn worker_exists(&mut self, worker_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Every registry entry carrying `name` (already folded).
    async fn endpoints_named(&mut self, name: &str) -> Result<Vec<EndpointRecord>, sqlx::Error>;

    /// What a custom domain (already folded) points at, shaped like a registry
    /// entry so worker targets carry their current project.
    async fn domain_endpoint(
        &mut self,
        domain: &str,
    ) -> Result<Option<EndpointRecord>, sqlx::Error>;

    /// `None` when the project does not exist.
    async fn routes_revision(&mut self, project_id: Uuid) -> Result<Option<i64>, sqlx::Error>;

    async fn project_routes(&mut self, project_id: Uuid) -> Result<Vec<RouteRecord>, sqlx::Error>;

    /// The `ASSETS` binding of the environment linked to the project's main worker.
    async fn assets_binding(
        &mut self,
        project_id: Uuid,
    ) -> Result<Option<BindingRecord>, sqlx::Error>;
}

pub struct PgSnapshot {
    tx: Transaction<'static, Postgres>,
}

impl PgSnapshot {
    /// Opens a read-only snapshot.
    ///
    /// # Errors
    /// Returns the `sqlx::Error` when no connection is available or the
    /// isolation level cannot be set.
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Self { tx })
    }

    /// Ends the snapshot.
    ///
    /// # Errors
    /// Returns the `sqlx::Error` from closing the transaction.
    pub async fn finish(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}

impl EndpointSource for PgSnapshot {
    async fn worker_exists(&mut self, worker_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM workers WHERE id = $1)")
            .bind(worker_id)
            .fetch_one(&mut *self.tx)
            .await
    }

    async fn endpoints_named(&mut self, name: &str) -> Result<Vec<EndpointRecord>, sqlx::Error> {
        registry::fetch_endpoints(&mut *self.tx, name).await
    }

    async fn domain_endpoint(
        &mut self,
        domain: &str,
    ) -> Result<Option<EndpointRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT d.worker_id, d.project_id, w.project_id AS worker_project_id \
             FROM domains d LEFT JOIN workers w ON w.id = d.worker_id \
             WHERE d.name = $1",
        )
        .bind(domain)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.and_then(|row| {
            let worker_id: Option<Uuid> = row.get("worker_id");
            let project_id: Option<Uuid> = row.get("project_id");
            let worker_project_id: Option<Uuid> = row.get("worker_project_id");
            match (worker_id, project_id) {
                (Some(id), None) => Some(EndpointRecord {
                    kind: EndpointKind::Worker,
                    id,
                    project_id: worker_project_id,
                }),
                (None, Some(id)) => Some(EndpointRecord {
                    kind: EndpointKind::Project,
                    id,
                    project_id: None,
                }),
                _ => None,
            }
        }))
    }

    async fn routes_revision(&mut self, project_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT routes_revision FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn project_routes(&mut self, project_id: Uuid) -> Result<Vec<RouteRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT pattern, priority, backend_type::text AS backend_type, worker_id
            FROM project_routes
            WHERE project_id = $1
            ",
        )
        .bind(project_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let backend: String = row.get("backend_type");
                Some(RouteRecord {
                    pattern: row.get("pattern"),
                    priority: row.get("priority"),
                    backend: RouteBackend::parse(&backend)?,
                    worker_id: row.get("worker_id"),
                })
            })
            .collect())
    }

    async fn assets_binding(
        &mut self,
        project_id: Uuid,
    ) -> Result<Option<BindingRecord>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT ev.value, ev.type::text AS value_type
            FROM workers w
            JOIN environment_values ev ON ev.environment_id = w.environment_id
            WHERE w.id = $1 AND ev.key = $2
            ",
        )
        .bind(project_id)
        .bind(ASSETS_KEY)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| {
            let value_type: String = row.get("value_type");
            BindingRecord {
                value: row.get("value"),
                value_type: BindingType::parse(&value_type),
            }
        }))
    }
}
