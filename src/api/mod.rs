use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

use crate::{resolver::Resolver, routing::TieBreak};

pub mod handlers;
mod openapi;

#[cfg(test)]
mod tests;

pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Shared read-side state: the resolver (with its route cache) and the
/// platform domain used to classify `Host` headers.
#[derive(Debug)]
pub struct RoutingState {
    pub resolver: Resolver,
    pub platform_domain: String,
}

impl RoutingState {
    #[must_use]
    pub fn new(tie_break: TieBreak, platform_domain: impl Into<String>) -> Self {
        Self {
            resolver: Resolver::new(tie_break),
            platform_domain: platform_domain.into(),
        }
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub dsn: SecretString,
    pub max_connections: u32,
    pub platform_domain: String,
    pub tie_break: TieBreak,
}

/// Wraps the documented routes with request ids, tracing and shared state.
pub fn app(pool: PgPool, routing: Arc<RoutingState>) -> Router {
    let (router, _openapi) = router().split_for_parts();
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID_HEADER),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(routing))
            .layer(Extension(pool)),
    )
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable or the listener cannot bind
pub async fn new(config: ServerConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(config.max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(config.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let routing = Arc::new(RoutingState::new(config.tie_break, config.platform_domain));
    info!(
        tie_break = %routing.resolver.tie_break(),
        platform_domain = %routing.platform_domain,
        "routing configured"
    );

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app(pool, routing).into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
