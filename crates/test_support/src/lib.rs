//! Container-backed fixtures for database tests.
//!
//! Tests call [`TestDatabase::start_or_skip`] and skip themselves on `None`:
//! no container runtime on the host is not a test failure. Anything that goes
//! wrong once a runtime is there is an error.

pub mod postgres;
pub mod runtime;
pub mod schema;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use postgres::PostgresContainer;

#[derive(Debug, Clone)]
pub struct TestNetwork {
    name: String,
}

impl TestNetwork {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            name: unique_name(prefix),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// A throwaway Postgres with a schema applied and a pool connected to it.
/// The container is removed when this value is dropped.
pub struct TestDatabase {
    postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDatabase {
    /// Like [`TestDatabase::start`], but `Ok(None)` when no container runtime
    /// is reachable.
    ///
    /// # Errors
    /// Returns an error when the container does not start or a schema
    /// statement fails.
    pub async fn start_or_skip(prefix: &str, schema_sql: &str) -> Result<Option<Self>> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping database test: {err}");
            return Ok(None);
        }
        Self::start(prefix, schema_sql).await.map(Some)
    }

    /// Starts Postgres on a fresh network and applies `schema_sql`.
    ///
    /// # Errors
    /// Returns an error when no container runtime is reachable, the container
    /// does not start, or a schema statement fails.
    pub async fn start(prefix: &str, schema_sql: &str) -> Result<Self> {
        runtime::ensure_container_runtime()?;

        let network = TestNetwork::new(prefix);
        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;
        schema::apply(&postgres.admin_dsn(), schema_sql).await?;

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&postgres.admin_dsn())
            .await
            .context("failed to connect test pool")?;

        Ok(Self { postgres, pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn dsn(&self) -> String {
        self.postgres.admin_dsn()
    }
}
