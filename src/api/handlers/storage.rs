use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;

use super::{
    principal::require_owner,
    types::{CreatedResponse, ErrorBody},
};
use crate::plane::{self, NewStorageConfig};

#[utoipa::path(
    post,
    path = "/v1/storage",
    request_body = NewStorageConfig,
    responses(
        (status = 201, description = "Storage config created.", body = CreatedResponse),
        (status = 400, description = "Missing name or provider.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 409, description = "Name already used by this owner.", body = ErrorBody),
    ),
    tag = "storage"
)]
pub async fn create_storage_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<NewStorageConfig>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::create_storage_config(&pool, principal.owner_id, payload).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(err) => err.into_response(),
    }
}
