#![allow(dead_code)]

use anyhow::Result;
use edgeplane::{
    model::{BindingType, CodeType},
    plane::{self, Deploy, EnvironmentValue, FunctionWorkerSpec, NewStorageConfig, StorageRoute},
};
use sqlx::PgPool;
use test_support::TestDatabase;
use uuid::Uuid;

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// `None` when no container runtime is available; the caller skips. Any other
/// startup failure, a broken schema included, fails the test.
pub async fn database(prefix: &str) -> Option<TestDatabase> {
    match TestDatabase::start_or_skip(prefix, SCHEMA_SQL).await {
        Ok(db) => db,
        Err(err) => panic!("test database failed to start: {err:#}"),
    }
}

pub async fn user(pool: &PgPool, username: &str) -> Result<Uuid> {
    Ok(plane::create_user(pool, username).await?)
}

pub fn deploy(code: &str) -> Deploy {
    Deploy {
        code: code.as_bytes().to_vec(),
        ..Deploy::default()
    }
}

pub fn storage(pattern: &str, priority: i32) -> StorageRoute {
    StorageRoute {
        pattern: pattern.to_string(),
        priority,
    }
}

pub fn function(pattern: &str) -> FunctionWorkerSpec {
    FunctionWorkerSpec {
        pattern: pattern.to_string(),
        code: b"export default { fetch() {} }".to_vec(),
        code_type: CodeType::Javascript,
    }
}

/// An environment whose `ASSETS` binding points at a fresh storage config.
pub async fn assets_environment(pool: &PgPool, owner: Uuid, name: &str) -> Result<(Uuid, Uuid)> {
    let storage_id = plane::create_storage_config(
        pool,
        owner,
        NewStorageConfig {
            name: format!("{name}-bucket"),
            provider: "s3".to_string(),
            bucket: Some(name.to_string()),
            prefix: None,
            endpoint: None,
            public_url: None,
        },
    )
    .await?;
    let environment_id = plane::create_environment(pool, owner, name).await?;
    plane::set_environment_value(
        pool,
        owner,
        environment_id,
        EnvironmentValue {
            key: "ASSETS".to_string(),
            value: storage_id.to_string(),
            value_type: BindingType::Storage,
        },
    )
    .await?;
    Ok((environment_id, storage_id))
}

pub async fn route_patterns(pool: &PgPool, project_id: Uuid) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar(
        "SELECT pattern FROM project_routes WHERE project_id = $1 ORDER BY pattern",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?)
}

pub async fn routes_revision(pool: &PgPool, project_id: Uuid) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT routes_revision FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_one(pool)
            .await?,
    )
}

pub async fn project_workers(pool: &PgPool, project_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM workers WHERE project_id = $1 ORDER BY id")
            .bind(project_id)
            .fetch_all(pool)
            .await?,
    )
}
