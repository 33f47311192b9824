//! Environment endpoints: creation and typed bindings.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    principal::require_owner,
    types::{CreateEnvironmentRequest, CreatedResponse, ErrorBody},
};
use crate::plane::{self, EnvironmentValue};

#[utoipa::path(
    post,
    path = "/v1/environments",
    request_body = CreateEnvironmentRequest,
    responses(
        (status = 201, description = "Environment created.", body = CreatedResponse),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 409, description = "Name already used by this owner.", body = ErrorBody),
    ),
    tag = "environments"
)]
pub async fn create_environment(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateEnvironmentRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::create_environment(&pool, principal.owner_id, &payload.name).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/environments/{environment_id}/values",
    request_body = EnvironmentValue,
    params(("environment_id" = Uuid, Path, description = "Environment id")),
    responses(
        (status = 204, description = "Binding stored."),
        (status = 400, description = "Malformed key or storage reference.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 403, description = "Storage config belongs to another owner.", body = ErrorBody),
        (status = 404, description = "Environment or storage config not found.", body = ErrorBody),
    ),
    tag = "environments"
)]
/// Inserts or replaces one binding. A `storage` value must be the id of a
/// storage config owned by the same user.
pub async fn set_environment_value(
    Path(environment_id): Path<Uuid>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<EnvironmentValue>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::set_environment_value(&pool, principal.owner_id, environment_id, payload).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
