use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};
use tokio::time::{Duration, sleep};

use crate::unique_name;

const POSTGRES_PORT: u16 = 5432;
const READY_ATTEMPTS: u32 = 40;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    tag: String,
    user: String,
    password: String,
    db_name: String,
}

impl PostgresConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tag: "17".to_string(),
            user: "edgeplane".to_string(),
            password: "edgeplane".to_string(),
            db_name: "edgeplane".to_string(),
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    #[must_use]
    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct PostgresContainer {
    _container: ContainerAsync<GenericImage>,
    host_port: u16,
    config: PostgresConfig,
}

impl PostgresContainer {
    /// Starts `postgres:<tag>` attached to `network`.
    ///
    /// # Errors
    /// Returns an error if the container fails to start or its port cannot be resolved.
    pub async fn start(network: &str) -> Result<Self> {
        Self::start_with_config(network, PostgresConfig::new()).await
    }

    /// # Errors
    /// Same as [`PostgresContainer::start`].
    pub async fn start_with_config(network: &str, config: PostgresConfig) -> Result<Self> {
        crate::runtime::ensure_container_runtime()?;
        let container = GenericImage::new("postgres", &config.tag)
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", &config.user)
            .with_env_var("POSTGRES_PASSWORD", &config.password)
            .with_env_var("POSTGRES_DB", &config.db_name)
            .with_network(network)
            .with_container_name(unique_name("edgeplane-pg"))
            .start()
            .await
            .context("Failed to start Postgres container")?;
        let host_port = container
            .get_host_port_ipv4(POSTGRES_PORT.tcp())
            .await
            .context("Failed to resolve Postgres host port")?;

        Ok(Self {
            _container: container,
            host_port,
            config,
        })
    }

    #[must_use]
    pub fn admin_dsn(&self) -> String {
        format!(
            "postgres://{}:{}@127.0.0.1:{}/{}?sslmode=disable",
            self.config.user, self.config.password, self.host_port, self.config.db_name
        )
    }

    #[must_use]
    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    /// Polls until a connection succeeds. The image logs "ready" once during
    /// init before restarting, so the wait condition alone is not enough.
    ///
    /// # Errors
    /// Returns the last connection error after all attempts fail.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let dsn = self.admin_dsn();
        let mut attempts = 0;
        loop {
            match PgConnection::connect(&dsn).await {
                Ok(connection) => {
                    connection.close().await.ok();
                    return Ok(());
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= READY_ATTEMPTS {
                        return Err(err).context("Postgres did not become ready");
                    }
                    sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }
}
