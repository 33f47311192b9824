use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use super::types::{CreateUserRequest, CreatedResponse, ErrorBody};
use crate::plane;

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created.", body = CreatedResponse),
        (status = 400, description = "Invalid username.", body = ErrorBody),
        (status = 409, description = "Username taken.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn create_user(
    pool: Extension<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> impl IntoResponse {
    match plane::create_user(&pool, &payload.username).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(err) => err.into_response(),
    }
}
