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
    types::{CreateProjectRequest, ErrorBody, LinkEnvironmentRequest},
};
use crate::{
    api::RoutingState,
    plane::{self, EnvironmentLink, ProjectRecord},
};

#[utoipa::path(
    post,
    path = "/v1/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created with its main worker and catch-all route.", body = ProjectRecord),
        (status = 400, description = "Invalid name.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 409, description = "Name taken by a worker or project.", body = ErrorBody),
    ),
    tag = "projects"
)]
pub async fn create_project(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::create_project(
        &pool,
        principal.owner_id,
        &payload.name,
        payload.environment_id,
    )
    .await
    {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/projects/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project and all its workers, routes and domains deleted."),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 404, description = "Project not found.", body = ErrorBody),
    ),
    tag = "projects"
)]
pub async fn delete_project(
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    routing: Extension<Arc<RoutingState>>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::delete_project(&pool, principal.owner_id, project_id).await {
        Ok(()) => {
            routing.resolver.cache().invalidate(project_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/projects/{project_id}/environment",
    request_body = LinkEnvironmentRequest,
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Environment set on the project and every member worker.", body = EnvironmentLink),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 403, description = "Environment belongs to another owner.", body = ErrorBody),
        (status = 404, description = "Project or environment not found.", body = ErrorBody),
    ),
    tag = "projects"
)]
pub async fn link_environment(
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<LinkEnvironmentRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::link_project_environment(
        &pool,
        principal.owner_id,
        project_id,
        payload.environment_id,
    )
    .await
    {
        Ok(link) => (StatusCode::OK, Json(link)).into_response(),
        Err(err) => err.into_response(),
    }
}
