//! Project and worker lifecycle.
//!
//! Every operation here is a single transaction: invariant checks, the write
//! itself, and the route-revision bump commit together or not at all. Locks
//! are always taken worker-first (a project's main worker shares its id), and
//! redeploys use `NOWAIT` so the loser of a concurrent deploy fails fast with
//! [`PlaneError::ConcurrentWrite`] instead of queueing behind the winner.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    error::{PlaneError, is_check_violation, is_foreign_key_violation, is_unique_violation},
    ownership::{check_environment, ensure_members_inherit},
    registry,
};
use crate::{
    model::{
        CATCH_ALL_PATTERN, CATCH_ALL_PRIORITY, CodeType, EndpointKind, FUNCTION_ROUTE_PRIORITY,
        RouteBackend,
    },
    routing::Pattern,
};

/// A storage-backed route requested by a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StorageRoute {
    pub pattern: String,
    pub priority: i32,
}

/// An anonymous worker created by a deploy and reachable only through `pattern`.
#[derive(Debug, Clone)]
pub struct FunctionWorkerSpec {
    pub pattern: String,
    pub code: Vec<u8>,
    pub code_type: CodeType,
}

#[derive(Debug, Clone, Default)]
pub struct Deploy {
    pub code: Vec<u8>,
    pub code_type: CodeType,
    pub message: Option<String>,
    pub storage_routes: Vec<StorageRoute>,
    pub functions: Vec<FunctionWorkerSpec>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeployOutcome {
    pub project_id: Uuid,
    pub version: i32,
    pub hash: String,
    /// `true` when this deploy turned a standalone worker into a project.
    pub upgraded: bool,
    pub function_workers: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub owner_id: Uuid,
    pub environment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub environment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Wait,
    NoWait,
}

#[derive(Debug)]
struct LockedWorker {
    owner_id: Uuid,
    name: Option<String>,
    environment_id: Option<Uuid>,
    project_id: Option<Uuid>,
}

/// Locks a worker row for the rest of the transaction.
async fn lock_worker(
    tx: &mut Transaction<'_, Postgres>,
    worker_id: Uuid,
    mode: LockMode,
) -> Result<Option<LockedWorker>, PlaneError> {
    let query = match mode {
        LockMode::Wait => {
            "SELECT user_id, name, environment_id, project_id FROM workers WHERE id = $1 FOR UPDATE"
        }
        LockMode::NoWait => {
            "SELECT user_id, name, environment_id, project_id FROM workers WHERE id = $1 FOR UPDATE NOWAIT"
        }
    };
    let row = sqlx::query(query)
        .bind(worker_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|row| LockedWorker {
        owner_id: row.get("user_id"),
        name: row.get("name"),
        environment_id: row.get("environment_id"),
        project_id: row.get("project_id"),
    }))
}

/// Hex-encoded sha-256 of deployed code.
#[must_use]
pub fn code_hash(code: &[u8]) -> String {
    format!("{:x}", Sha256::digest(code))
}

/// Appends the next deployment version for a locked worker and makes it current.
async fn append_deployment(
    tx: &mut Transaction<'_, Postgres>,
    worker_id: Uuid,
    code: &[u8],
    code_type: CodeType,
    message: Option<&str>,
) -> Result<(i32, String), PlaneError> {
    let hash = code_hash(code);
    let version: i32 = sqlx::query_scalar(
        r"
        INSERT INTO worker_deployments (worker_id, version, hash, code_type, code, message)
        SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3, $4, $5
        FROM worker_deployments
        WHERE worker_id = $1
        RETURNING version
        ",
    )
    .bind(worker_id)
    .bind(&hash)
    .bind(code_type.as_str())
    .bind(code)
    .bind(message)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("UPDATE workers SET current_version = $2, updated_at = NOW() WHERE id = $1")
        .bind(worker_id)
        .bind(version)
        .execute(&mut **tx)
        .await?;

    Ok((version, hash))
}

async fn insert_route(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
    pattern: &str,
    priority: i32,
    backend: RouteBackend,
    worker_id: Option<Uuid>,
) -> Result<(), PlaneError> {
    sqlx::query(
        r"
        INSERT INTO project_routes (project_id, pattern, priority, backend_type, worker_id)
        VALUES ($1, $2, $3, $4::route_backend, $5)
        ",
    )
    .bind(project_id)
    .bind(pattern)
    .bind(priority)
    .bind(backend.as_str())
    .bind(worker_id)
    .execute(&mut **tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::RouteConflict(pattern.to_string())
        } else if is_check_violation(&err) {
            PlaneError::InvalidRoute {
                pattern: pattern.to_string(),
                reason: "rejected by the route table".to_string(),
            }
        } else {
            PlaneError::from(err)
        }
    })?;
    Ok(())
}

/// Marks the project's route set as changed so cached tables are recompiled.
async fn bump_routes_revision(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
) -> Result<(), PlaneError> {
    sqlx::query(
        "UPDATE projects SET routes_revision = routes_revision + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn parse_route_pattern(pattern: &str) -> Result<(), PlaneError> {
    Pattern::parse(pattern)
        .map(|_| ())
        .map_err(|err| PlaneError::InvalidRoute {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

/// Validates the route set a deploy is about to install.
///
/// Storage priorities must be positive: priority 0 is reserved for the
/// catch-all, the one route that survives redeploys.
fn validate_deploy_routes(deploy: &Deploy) -> Result<(), PlaneError> {
    let mut seen = HashSet::new();
    for route in &deploy.storage_routes {
        parse_route_pattern(&route.pattern)?;
        if route.priority <= CATCH_ALL_PRIORITY {
            return Err(PlaneError::InvalidInput(
                "storage route priority must be greater than zero",
            ));
        }
        if !seen.insert(route.pattern.as_str()) {
            return Err(PlaneError::RouteConflict(route.pattern.clone()));
        }
    }
    for function in &deploy.functions {
        parse_route_pattern(&function.pattern)?;
        if function.code.is_empty() {
            return Err(PlaneError::InvalidInput("function worker code is empty"));
        }
        if !seen.insert(function.pattern.as_str()) {
            return Err(PlaneError::RouteConflict(function.pattern.clone()));
        }
    }
    Ok(())
}

/// Turns a locked standalone worker into a project sharing its id, name,
/// owner and environment, with the catch-all route pointing back at it.
async fn upgrade_locked(
    tx: &mut Transaction<'_, Postgres>,
    worker_id: Uuid,
    worker: &LockedWorker,
) -> Result<ProjectRecord, PlaneError> {
    if worker.project_id.is_some() {
        return Err(PlaneError::AlreadyInProject);
    }
    let name = worker
        .name
        .as_deref()
        .ok_or(PlaneError::InvalidInput("only named workers can become projects"))?;

    let name = registry::register(tx, name, EndpointKind::Project, worker_id).await?;
    check_environment(tx, worker.owner_id, worker.environment_id).await?;

    sqlx::query(
        r"
        INSERT INTO projects (id, name, user_id, environment_id, routes_revision)
        VALUES ($1, $2, $3, $4, 1)
        ",
    )
    .bind(worker_id)
    .bind(&name)
    .bind(worker.owner_id)
    .bind(worker.environment_id)
    .execute(&mut **tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::NameConflict(name.clone())
        } else {
            PlaneError::from(err)
        }
    })?;

    sqlx::query("UPDATE workers SET project_id = $1, updated_at = NOW() WHERE id = $1")
        .bind(worker_id)
        .execute(&mut **tx)
        .await?;

    insert_route(
        tx,
        worker_id,
        CATCH_ALL_PATTERN,
        CATCH_ALL_PRIORITY,
        RouteBackend::Worker,
        Some(worker_id),
    )
    .await?;

    ensure_members_inherit(tx, worker_id).await?;

    Ok(ProjectRecord {
        id: worker_id,
        name,
        owner_id: worker.owner_id,
        environment_id: worker.environment_id,
    })
}

/// Creates a standalone named worker.
///
/// # Errors
/// Returns [`PlaneError::InvalidName`], [`PlaneError::NameConflict`],
/// [`PlaneError::NotFound`] or [`PlaneError::OwnershipMismatch`] for the
/// environment, or a database error.
#[instrument(skip(pool))]
pub async fn create_worker(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    environment_id: Option<Uuid>,
) -> Result<WorkerRecord, PlaneError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let name = registry::register(&mut tx, name, EndpointKind::Worker, id).await?;
    check_environment(&mut tx, owner_id, environment_id).await?;

    sqlx::query(
        r"
        INSERT INTO workers (id, name, user_id, environment_id)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(id)
    .bind(&name)
    .bind(owner_id)
    .bind(environment_id)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::NameConflict(name.clone())
        } else if is_foreign_key_violation(&err) {
            PlaneError::NotFound("user")
        } else {
            PlaneError::from(err)
        }
    })?;

    tx.commit().await?;
    info!(worker_id = %id, %name, "worker created");

    Ok(WorkerRecord {
        id,
        name: Some(name),
        owner_id,
        environment_id,
        project_id: None,
    })
}

/// Creates a project directly, together with its anonymous main worker and
/// the catch-all route.
///
/// # Errors
/// Same as [`create_worker`].
#[instrument(skip(pool))]
pub async fn create_project(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
    environment_id: Option<Uuid>,
) -> Result<ProjectRecord, PlaneError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let name = registry::register(&mut tx, name, EndpointKind::Project, id).await?;
    check_environment(&mut tx, owner_id, environment_id).await?;

    sqlx::query(
        r"
        INSERT INTO projects (id, name, user_id, environment_id, routes_revision)
        VALUES ($1, $2, $3, $4, 1)
        ",
    )
    .bind(id)
    .bind(&name)
    .bind(owner_id)
    .bind(environment_id)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::NameConflict(name.clone())
        } else if is_foreign_key_violation(&err) {
            PlaneError::NotFound("user")
        } else {
            PlaneError::from(err)
        }
    })?;

    sqlx::query(
        r"
        INSERT INTO workers (id, name, user_id, environment_id, project_id)
        VALUES ($1, NULL, $2, $3, $1)
        ",
    )
    .bind(id)
    .bind(owner_id)
    .bind(environment_id)
    .execute(&mut *tx)
    .await?;

    insert_route(
        &mut tx,
        id,
        CATCH_ALL_PATTERN,
        CATCH_ALL_PRIORITY,
        RouteBackend::Worker,
        Some(id),
    )
    .await?;

    tx.commit().await?;
    info!(project_id = %id, %name, "project created");

    Ok(ProjectRecord {
        id,
        name,
        owner_id,
        environment_id,
    })
}

/// Upgrades a standalone worker into a project with the same id.
///
/// # Errors
/// Returns [`PlaneError::NotFound`] for unknown or foreign workers and
/// [`PlaneError::AlreadyInProject`] when the worker is already a member; in
/// both cases nothing is written.
#[instrument(skip(pool))]
pub async fn upgrade_worker_to_project(
    pool: &PgPool,
    owner_id: Uuid,
    worker_id: Uuid,
) -> Result<ProjectRecord, PlaneError> {
    let mut tx = pool.begin().await?;

    let worker = lock_worker(&mut tx, worker_id, LockMode::Wait)
        .await?
        .filter(|worker| worker.owner_id == owner_id)
        .ok_or(PlaneError::NotFound("worker"))?;

    let project = upgrade_locked(&mut tx, worker_id, &worker).await?;

    tx.commit().await?;
    info!(project_id = %project.id, name = %project.name, "worker upgraded to project");

    Ok(project)
}

/// Deploys new code for a main (or standalone) worker and replaces the
/// project's route set.
///
/// In one transaction: append a deployment, upgrade a standalone worker to a
/// project, drop every non-catch-all route and every function worker, insert
/// the requested storage routes, then create each function worker with its
/// first deployment and a priority-10 route. Any failure leaves the previous
/// state untouched.
///
/// # Errors
/// Returns [`PlaneError::ConcurrentWrite`] when another deploy holds the
/// worker, [`PlaneError::RouteConflict`] / [`PlaneError::InvalidRoute`] for a
/// bad route set, [`PlaneError::NotFound`] for unknown workers, or a database
/// error.
#[instrument(
    skip(pool, deploy),
    fields(
        code_len = deploy.code.len(),
        routes = deploy.storage_routes.len(),
        functions = deploy.functions.len()
    )
)]
pub async fn deploy_project(
    pool: &PgPool,
    owner_id: Uuid,
    worker_id: Uuid,
    deploy: Deploy,
) -> Result<DeployOutcome, PlaneError> {
    if deploy.code.is_empty() {
        return Err(PlaneError::InvalidInput("deployment code is empty"));
    }
    validate_deploy_routes(&deploy)?;

    let mut tx = pool.begin().await?;

    let worker = lock_worker(&mut tx, worker_id, LockMode::NoWait)
        .await?
        .filter(|worker| worker.owner_id == owner_id)
        .ok_or(PlaneError::NotFound("worker"))?;
    if worker.project_id.is_some_and(|project_id| project_id != worker_id) {
        return Err(PlaneError::InvalidInput(
            "function workers are deployed through their project",
        ));
    }

    let (version, hash) = append_deployment(
        &mut tx,
        worker_id,
        &deploy.code,
        deploy.code_type,
        deploy.message.as_deref(),
    )
    .await?;

    let upgraded = worker.project_id.is_none();
    if upgraded {
        upgrade_locked(&mut tx, worker_id, &worker).await?;
    }
    let project_id = worker_id;

    let environment_id: Option<Uuid> =
        sqlx::query_scalar("SELECT environment_id FROM projects WHERE id = $1 FOR UPDATE")
            .bind(project_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(PlaneError::NotFound("project"))?;

    sqlx::query("DELETE FROM project_routes WHERE project_id = $1 AND priority <> $2")
        .bind(project_id)
        .bind(CATCH_ALL_PRIORITY)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM workers WHERE project_id = $1 AND id <> $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    for route in &deploy.storage_routes {
        insert_route(
            &mut tx,
            project_id,
            &route.pattern,
            route.priority,
            RouteBackend::Storage,
            None,
        )
        .await?;
    }

    let mut function_workers = Vec::with_capacity(deploy.functions.len());
    for function in &deploy.functions {
        let function_id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO workers (id, name, user_id, environment_id, project_id)
            VALUES ($1, NULL, $2, $3, $4)
            ",
        )
        .bind(function_id)
        .bind(owner_id)
        .bind(environment_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        append_deployment(&mut tx, function_id, &function.code, function.code_type, None).await?;
        insert_route(
            &mut tx,
            project_id,
            &function.pattern,
            FUNCTION_ROUTE_PRIORITY,
            RouteBackend::Worker,
            Some(function_id),
        )
        .await?;
        function_workers.push(function_id);
    }

    bump_routes_revision(&mut tx, project_id).await?;
    ensure_members_inherit(&mut tx, project_id).await?;

    tx.commit().await?;
    info!(%project_id, version, upgraded, functions = function_workers.len(), "project deployed");

    Ok(DeployOutcome {
        project_id,
        version,
        hash,
        upgraded,
        function_workers,
    })
}

/// Deletes a standalone worker or a function worker.
///
/// Returns the project whose route set changed, if any.
///
/// # Errors
/// Returns [`PlaneError::MainWorkerProtected`] for a project's main worker and
/// [`PlaneError::NotFound`] for unknown or foreign workers.
#[instrument(skip(pool))]
pub async fn delete_worker(
    pool: &PgPool,
    owner_id: Uuid,
    worker_id: Uuid,
) -> Result<Option<Uuid>, PlaneError> {
    let mut tx = pool.begin().await?;

    let worker = lock_worker(&mut tx, worker_id, LockMode::Wait)
        .await?
        .filter(|worker| worker.owner_id == owner_id)
        .ok_or(PlaneError::NotFound("worker"))?;
    if worker.project_id == Some(worker_id) {
        return Err(PlaneError::MainWorkerProtected);
    }

    sqlx::query("DELETE FROM workers WHERE id = $1")
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
    if let Some(project_id) = worker.project_id {
        bump_routes_revision(&mut tx, project_id).await?;
    }

    tx.commit().await?;
    info!(%worker_id, project_id = ?worker.project_id, "worker deleted");

    Ok(worker.project_id)
}

/// Deletes a project; its workers (main worker included), routes,
/// deployments and domains go with it.
///
/// # Errors
/// Returns [`PlaneError::NotFound`] for unknown or foreign projects.
#[instrument(skip(pool))]
pub async fn delete_project(
    pool: &PgPool,
    owner_id: Uuid,
    project_id: Uuid,
) -> Result<(), PlaneError> {
    let mut tx = pool.begin().await?;

    lock_worker(&mut tx, project_id, LockMode::Wait).await?;
    let deleted = sqlx::query("DELETE FROM projects WHERE id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(PlaneError::NotFound("project"));
    }

    tx.commit().await?;
    info!(%project_id, "project deleted");

    Ok(())
}
