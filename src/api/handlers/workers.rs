//! Worker endpoints: creation, deletion, environment linking, upgrade and deploy.
//!
//! Handlers only parse inputs; invariants are enforced by `plane`. Any write
//! that can change a project's route set drops the cached route table after
//! commit.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    principal::require_owner,
    types::{CreateWorkerRequest, DeployRequest, ErrorBody, LinkEnvironmentRequest},
};
use crate::{
    api::RoutingState,
    plane::{self, Deploy, DeployOutcome, EnvironmentLink, ProjectRecord, WorkerRecord},
};

#[utoipa::path(
    post,
    path = "/v1/workers",
    request_body = CreateWorkerRequest,
    responses(
        (status = 201, description = "Worker created.", body = WorkerRecord),
        (status = 400, description = "Invalid name.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 403, description = "Environment belongs to another owner.", body = ErrorBody),
        (status = 409, description = "Name taken by a worker or project.", body = ErrorBody),
    ),
    tag = "workers"
)]
pub async fn create_worker(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateWorkerRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::create_worker(
        &pool,
        principal.owner_id,
        &payload.name,
        payload.environment_id,
    )
    .await
    {
        Ok(worker) => (StatusCode::CREATED, Json(worker)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/workers/{worker_id}",
    params(("worker_id" = Uuid, Path, description = "Worker id")),
    responses(
        (status = 204, description = "Worker deleted."),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 404, description = "Worker not found.", body = ErrorBody),
        (status = 422, description = "Main workers are removed with their project.", body = ErrorBody),
    ),
    tag = "workers"
)]
pub async fn delete_worker(
    Path(worker_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    routing: Extension<Arc<RoutingState>>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::delete_worker(&pool, principal.owner_id, worker_id).await {
        Ok(project_id) => {
            if let Some(project_id) = project_id {
                routing.resolver.cache().invalidate(project_id);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/workers/{worker_id}/environment",
    request_body = LinkEnvironmentRequest,
    params(("worker_id" = Uuid, Path, description = "Worker id")),
    responses(
        (status = 200, description = "Environment linked; project members updated together.", body = EnvironmentLink),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 403, description = "Environment belongs to another owner.", body = ErrorBody),
        (status = 404, description = "Worker or environment not found.", body = ErrorBody),
    ),
    tag = "workers"
)]
pub async fn link_environment(
    Path(worker_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<LinkEnvironmentRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::link_worker_environment(
        &pool,
        principal.owner_id,
        worker_id,
        payload.environment_id,
    )
    .await
    {
        Ok(link) => (StatusCode::OK, Json(link)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/workers/{worker_id}/upgrade",
    params(("worker_id" = Uuid, Path, description = "Worker id")),
    responses(
        (status = 200, description = "Worker upgraded; the project shares its id.", body = ProjectRecord),
        (status = 400, description = "Anonymous workers cannot become projects.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 404, description = "Worker not found.", body = ErrorBody),
        (status = 409, description = "Worker already belongs to a project.", body = ErrorBody),
    ),
    tag = "workers"
)]
pub async fn upgrade_worker(
    Path(worker_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    routing: Extension<Arc<RoutingState>>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::upgrade_worker_to_project(&pool, principal.owner_id, worker_id).await {
        Ok(project) => {
            routing.resolver.cache().invalidate(project.id);
            (StatusCode::OK, Json(project)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/workers/{worker_id}/deploy",
    request_body = DeployRequest,
    params(("worker_id" = Uuid, Path, description = "Main or standalone worker id")),
    responses(
        (status = 200, description = "Deployed; routes and function workers replaced.", body = DeployOutcome),
        (status = 400, description = "Invalid code, route pattern or priority.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 404, description = "Worker not found.", body = ErrorBody),
        (status = 409, description = "Duplicate route pattern or a concurrent deploy.", body = ErrorBody),
    ),
    tag = "workers"
)]
/// Deploys code and replaces the project's routes in one transaction. A
/// standalone worker is upgraded to a project first.
pub async fn deploy(
    Path(worker_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    routing: Extension<Arc<RoutingState>>,
    Json(payload): Json<DeployRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let deploy = match Deploy::try_from(payload) {
        Ok(deploy) => deploy,
        Err(err) => return err.into_response(),
    };

    match plane::deploy_project(&pool, principal.owner_id, worker_id, deploy).await {
        Ok(outcome) => {
            routing.resolver.cache().invalidate(outcome.project_id);
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
