//! Ownership and environment consistency.
//!
//! These checks replace database write hooks: each is an explicit function
//! called inside the transaction of the write it guards.
//!
//! - A worker and its project have the same owner.
//! - A worker or project and its environment have the same owner.
//! - Every worker of a project carries the project's environment. Changing the
//!   environment goes through [`link_worker_environment`], which cascades to
//!   the project and all sibling workers in one transaction.

use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::PlaneError;

/// Rejects a link between entities owned by different users.
///
/// # Errors
/// Returns [`PlaneError::OwnershipMismatch`] naming the linked entity.
pub fn ensure_same_owner(
    owner: Uuid,
    linked_owner: Uuid,
    linked: &'static str,
) -> Result<(), PlaneError> {
    if owner == linked_owner {
        Ok(())
    } else {
        Err(PlaneError::OwnershipMismatch(linked))
    }
}

/// Returns the owner of an environment.
///
/// # Errors
/// Returns [`PlaneError::NotFound`] when the environment does not exist.
pub async fn environment_owner(
    conn: &mut PgConnection,
    environment_id: Uuid,
) -> Result<Uuid, PlaneError> {
    sqlx::query_scalar("SELECT user_id FROM environments WHERE id = $1")
        .bind(environment_id)
        .fetch_optional(conn)
        .await?
        .ok_or(PlaneError::NotFound("environment"))
}

/// Validates that an optional environment link is owned by `owner`.
///
/// # Errors
/// Returns [`PlaneError::NotFound`] or [`PlaneError::OwnershipMismatch`].
pub async fn check_environment(
    conn: &mut PgConnection,
    owner: Uuid,
    environment_id: Option<Uuid>,
) -> Result<(), PlaneError> {
    let Some(environment_id) = environment_id else {
        return Ok(());
    };
    let env_owner = environment_owner(conn, environment_id).await?;
    ensure_same_owner(owner, env_owner, "environment")
}

/// Asserts that every member of `project_id` shares the project's environment.
/// Run before committing any write that touches project membership.
///
/// # Errors
/// Returns [`PlaneError::EnvironmentMismatch`] when a member diverges.
pub async fn ensure_members_inherit(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
) -> Result<(), PlaneError> {
    let diverging: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*)
        FROM workers w
        JOIN projects p ON p.id = w.project_id
        WHERE p.id = $1
          AND (w.environment_id IS DISTINCT FROM p.environment_id OR w.user_id <> p.user_id)
        ",
    )
    .bind(project_id)
    .fetch_one(&mut **tx)
    .await?;

    if diverging > 0 {
        return Err(PlaneError::EnvironmentMismatch);
    }
    Ok(())
}

/// Outcome of an environment link: which entities now carry `environment_id`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnvironmentLink {
    pub environment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub workers: Vec<Uuid>,
}

/// Sets (or clears, with `None`) the environment of a worker.
///
/// A standalone worker is updated alone. A project member updates the project
/// and every sibling worker; the whole cascade commits or nothing does.
/// Callers only see their own workers; others are reported as not found.
///
/// # Errors
/// Returns [`PlaneError::NotFound`], [`PlaneError::OwnershipMismatch`],
/// [`PlaneError::EnvironmentMismatch`] or a database error.
#[instrument(skip(pool))]
pub async fn link_worker_environment(
    pool: &PgPool,
    owner_id: Uuid,
    worker_id: Uuid,
    environment_id: Option<Uuid>,
) -> Result<EnvironmentLink, PlaneError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT user_id, project_id FROM workers WHERE id = $1 FOR UPDATE")
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PlaneError::NotFound("worker"))?;
    let worker_owner: Uuid = row.get("user_id");
    let project_id: Option<Uuid> = row.get("project_id");
    if worker_owner != owner_id {
        return Err(PlaneError::NotFound("worker"));
    }

    check_environment(&mut tx, worker_owner, environment_id).await?;

    let workers = if let Some(project_id) = project_id {
        let project_owner: Uuid =
            sqlx::query_scalar("SELECT user_id FROM projects WHERE id = $1 FOR UPDATE")
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(PlaneError::NotFound("project"))?;
        ensure_same_owner(worker_owner, project_owner, "project")?;

        sqlx::query("UPDATE projects SET environment_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(project_id)
            .bind(environment_id)
            .execute(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"
            UPDATE workers
            SET environment_id = $2, updated_at = NOW()
            WHERE project_id = $1
            RETURNING id
            ",
        )
        .bind(project_id)
        .bind(environment_id)
        .fetch_all(&mut *tx)
        .await?;

        ensure_members_inherit(&mut tx, project_id).await?;
        ids
    } else {
        sqlx::query("UPDATE workers SET environment_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(worker_id)
            .bind(environment_id)
            .execute(&mut *tx)
            .await?;
        vec![worker_id]
    };

    tx.commit().await?;

    info!(
        %worker_id,
        project_id = ?project_id,
        environment_id = ?environment_id,
        updated = workers.len(),
        "environment linked"
    );

    Ok(EnvironmentLink {
        environment_id,
        project_id,
        workers,
    })
}

/// Sets the environment of a project and all of its workers.
///
/// Goes through the main worker (which shares the project id) so locks are
/// always taken worker-first, the same order every other project write uses.
///
/// # Errors
/// Same as [`link_worker_environment`].
pub async fn link_project_environment(
    pool: &PgPool,
    owner_id: Uuid,
    project_id: Uuid,
    environment_id: Option<Uuid>,
) -> Result<EnvironmentLink, PlaneError> {
    link_worker_environment(pool, owner_id, project_id, environment_id)
        .await
        .map_err(|err| match err {
            PlaneError::NotFound("worker") => PlaneError::NotFound("project"),
            other => other,
        })
}
