use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;

use super::{
    principal::require_owner,
    types::{CreateDomainRequest, ErrorBody},
};
use crate::plane::{self, DomainRecord};

#[utoipa::path(
    post,
    path = "/v1/domains",
    request_body = CreateDomainRequest,
    responses(
        (status = 201, description = "Domain registered.", body = DomainRecord),
        (status = 400, description = "Invalid domain name.", body = ErrorBody),
        (status = 401, description = "Missing or invalid x-owner-id."),
        (status = 404, description = "Target not found.", body = ErrorBody),
        (status = 409, description = "Domain already registered.", body = ErrorBody),
    ),
    tag = "domains"
)]
pub async fn create_domain(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<CreateDomainRequest>,
) -> impl IntoResponse {
    let principal = match require_owner(&headers) {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match plane::add_domain(&pool, principal.owner_id, &payload.name, payload.target).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}
