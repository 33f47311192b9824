//! The HTTP surface wired to a real database: control-plane calls followed by
//! resolve lookups through the same router.

#![allow(clippy::unwrap_used)]

mod common;

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use edgeplane::{
    api::{RoutingState, app, handlers::principal::OWNER_HEADER},
    routing::TieBreak,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// "export default {}"
const CODE: &str = "ZXhwb3J0IGRlZmF1bHQge30=";

fn request(method: &str, uri: &str, owner: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header(OWNER_HEADER, owner.to_string());
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn id_of(body: &Value) -> Uuid {
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn deploy_then_resolve_over_http() -> Result<()> {
    let Some(db) = common::database("edgeplane-http").await else {
        return Ok(());
    };
    let router = app(
        db.pool().clone(),
        Arc::new(RoutingState::new(TieBreak::Lexical, "workers.dev")),
    );

    let response = send(
        &router,
        request("POST", "/v1/users", None, Some(json!({"username": "alice"}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let owner = id_of(&json_body(response).await);

    let response = send(
        &router,
        request("POST", "/v1/workers", Some(owner), Some(json!({"name": "shop"}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let worker_id = id_of(&json_body(response).await);

    let response = send(
        &router,
        request("POST", "/v1/projects", Some(owner), Some(json!({"name": "SHOP"}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "name_conflict");

    let response = send(
        &router,
        request(
            "POST",
            &format!("/v1/workers/{worker_id}/deploy"),
            Some(owner),
            Some(json!({
                "code": CODE,
                "functions": [{"pattern": "/api/*", "code": CODE}]
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["version"], 1);
    assert_eq!(outcome["upgraded"], true);
    let api_worker = outcome["function_workers"][0].as_str().unwrap().to_string();

    let response = send(
        &router,
        request(
            "POST",
            "/v1/resolve",
            None,
            Some(json!({"host": "shop.workers.dev", "path": "/api/orders?page=2"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let resolution = json_body(response).await;
    assert_eq!(resolution["kind"], "project_worker");
    assert_eq!(resolution["worker_id"], api_worker.as_str());

    let response = send(
        &router,
        request(
            "DELETE",
            &format!("/v1/workers/{worker_id}"),
            Some(owner),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["error"], "main_worker_protected");

    let response = send(
        &router,
        request(
            "DELETE",
            &format!("/v1/workers/{api_worker}"),
            Some(owner),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &router,
        request(
            "POST",
            "/v1/resolve",
            None,
            Some(json!({"subdomain": "shop", "path": "/api/orders"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["worker_id"], worker_id.to_string());

    let response = send(
        &router,
        request("GET", "/health", None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn foreign_owner_cannot_touch_workers() -> Result<()> {
    let Some(db) = common::database("edgeplane-http-owner").await else {
        return Ok(());
    };
    let pool = db.pool();
    let owner = common::user(pool, "bob").await?;
    let stranger = common::user(pool, "eve").await?;
    let worker = edgeplane::plane::create_worker(pool, owner, "ledger", None).await?;
    let router = app(
        pool.clone(),
        Arc::new(RoutingState::new(TieBreak::Lexical, "workers.dev")),
    );

    let response = send(
        &router,
        request(
            "DELETE",
            &format!("/v1/workers/{}", worker.id),
            Some(stranger),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &router,
        request(
            "POST",
            "/v1/resolve",
            None,
            Some(json!({"subdomain": "ledger"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["kind"], "worker");
    Ok(())
}
