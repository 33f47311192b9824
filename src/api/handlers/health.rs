use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is reachable", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(pool: Extension<PgPool>) -> impl IntoResponse {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let database_ok = match pool.0.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(err) => {
                    error!("Failed to ping database: {err}");
                    false
                }
            }
        }
        Err(err) => {
            error!("Failed to acquire database connection: {err}");
            false
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "ok" } else { "error" }.to_string(),
    };

    let short_hash = health.commit.get(..7).unwrap_or("");
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&format!("{}:{}:{}", health.name, health.version, short_hash)) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to build X-App header: {err}"),
    }

    debug!(database = %health.database, "health check");

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, Json(health))
}
