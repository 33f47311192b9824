//! Router tests that never reach the database: request validation and the
//! paths that answer before any query runs.

#![allow(clippy::unwrap_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

use super::{RoutingState, app, handlers::principal::OWNER_HEADER};
use crate::routing::TieBreak;

fn test_app() -> Router {
    // Nothing listens on port 1, so any query fails fast.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(300))
        .connect_lazy("postgres://edgeplane@127.0.0.1:1/edgeplane")
        .unwrap();
    app(
        pool,
        Arc::new(RoutingState::new(TieBreak::Lexical, "workers.dev")),
    )
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_unreachable_database() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get("x-request-id").map(|v| v.as_bytes()),
        Some(b"req-1".as_slice())
    );
    assert!(response.headers().contains_key("x-app"));
    let body = body_json(response).await;
    assert_eq!(body["database"], "error");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn resolve_without_identity_is_unresolved() {
    let response = test_app()
        .oneshot(post_json("/v1/resolve", &json!({"path": "/"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["kind"], "unresolved");
}

#[tokio::test]
async fn bare_platform_host_carries_no_identity() {
    let response = test_app()
        .oneshot(post_json("/v1/resolve", &json!({"host": "workers.dev:443"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["kind"], "unresolved");
}

#[tokio::test]
async fn resolve_read_failure_is_503() {
    let response = test_app()
        .oneshot(post_json("/v1/resolve", &json!({"subdomain": "api"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn management_requires_owner_header() {
    let response = test_app()
        .oneshot(post_json("/v1/workers", &json!({"name": "api"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deploy_rejects_undecodable_code_before_touching_state() {
    let mut request = post_json(
        &format!("/v1/workers/{}/deploy", Uuid::new_v4()),
        &json!({"code": "%%%"}),
    );
    request
        .headers_mut()
        .insert(OWNER_HEADER, Uuid::new_v4().to_string().parse().unwrap());

    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_input");
}
