//! Dispatch lookup for the edge layer.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::types::{AmbiguousRouteBody, ResolveRequest};
use crate::{
    api::RoutingState,
    resolver::{Resolution, ResolveError},
};

#[utoipa::path(
    post,
    path = "/v1/resolve",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Dispatch target.", body = Resolution),
        (status = 404, description = "Unresolved identity, missing assets binding, or no matching route.", body = Resolution),
        (status = 409, description = "Two routes tie and the tie-break policy is `reject`.", body = AmbiguousRouteBody),
        (status = 503, description = "The routing state could not be read."),
    ),
    tag = "resolve"
)]
/// Resolves a request identity and path to a worker or storage target.
/// Every failure classification is a routing miss for the caller; the body
/// tells the edge which one.
pub async fn resolve(
    pool: Extension<PgPool>,
    routing: Extension<Arc<RoutingState>>,
    Json(request): Json<ResolveRequest>,
) -> impl IntoResponse {
    let identity = request.identity(&routing.platform_domain);

    match routing
        .resolver
        .resolve(&pool, &identity, &request.path)
        .await
    {
        Ok(resolution) if resolution.is_dispatchable() => {
            (StatusCode::OK, Json(resolution)).into_response()
        }
        Ok(resolution) => (StatusCode::NOT_FOUND, Json(resolution)).into_response(),
        Err(ResolveError::AmbiguousRoute {
            project_id,
            patterns,
        }) => (
            StatusCode::CONFLICT,
            Json(AmbiguousRouteBody {
                error: "ambiguous_route".to_string(),
                project_id,
                patterns,
            }),
        )
            .into_response(),
        Err(ResolveError::Database(err)) => {
            error!("Failed to read routing state: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
