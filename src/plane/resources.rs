//! Users, storage configs, environments and custom domains.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    error::{PlaneError, is_foreign_key_violation, is_unique_violation},
    names,
    ownership::{ensure_same_owner, environment_owner},
};
use crate::model::{BindingType, DomainTarget};

/// Creates a user. Usernames follow the endpoint-name syntax.
///
/// # Errors
/// Returns [`PlaneError::InvalidName`] or [`PlaneError::NameConflict`].
#[instrument(skip(pool))]
pub async fn create_user(pool: &PgPool, username: &str) -> Result<Uuid, PlaneError> {
    let username = names::normalize_name(username)?;
    let id: Uuid = sqlx::query_scalar("INSERT INTO users (username) VALUES ($1) RETURNING id")
        .bind(&username)
        .fetch_one(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                PlaneError::NameConflict(username.clone())
            } else {
                PlaneError::from(err)
            }
        })?;
    info!(user_id = %id, %username, "user created");
    Ok(id)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewStorageConfig {
    pub name: String,
    pub provider: String,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub endpoint: Option<String>,
    pub public_url: Option<String>,
}

/// Creates a storage config owned by `owner_id`.
///
/// # Errors
/// Returns [`PlaneError::InvalidInput`] for blank fields,
/// [`PlaneError::NameConflict`] when the owner already uses the name, or
/// [`PlaneError::NotFound`] for an unknown owner.
#[instrument(skip(pool, config), fields(name = %config.name, provider = %config.provider))]
pub async fn create_storage_config(
    pool: &PgPool,
    owner_id: Uuid,
    config: NewStorageConfig,
) -> Result<Uuid, PlaneError> {
    let name = config.name.trim();
    if name.is_empty() || config.provider.trim().is_empty() {
        return Err(PlaneError::InvalidInput(
            "storage config name and provider are required",
        ));
    }

    let id: Uuid = sqlx::query_scalar(
        r"
        INSERT INTO storage_configs (user_id, name, provider, bucket, prefix, endpoint, public_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        ",
    )
    .bind(owner_id)
    .bind(name)
    .bind(config.provider.trim())
    .bind(config.bucket.as_deref())
    .bind(config.prefix.as_deref())
    .bind(config.endpoint.as_deref())
    .bind(config.public_url.as_deref())
    .fetch_one(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::NameConflict(name.to_string())
        } else if is_foreign_key_violation(&err) {
            PlaneError::NotFound("user")
        } else {
            PlaneError::from(err)
        }
    })?;

    info!(storage_config_id = %id, "storage config created");
    Ok(id)
}

/// Creates an empty environment owned by `owner_id`.
///
/// # Errors
/// Returns [`PlaneError::InvalidInput`], [`PlaneError::NameConflict`] or
/// [`PlaneError::NotFound`] for an unknown owner.
#[instrument(skip(pool))]
pub async fn create_environment(
    pool: &PgPool,
    owner_id: Uuid,
    name: &str,
) -> Result<Uuid, PlaneError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PlaneError::InvalidInput("environment name is required"));
    }

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO environments (user_id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::NameConflict(name.to_string())
        } else if is_foreign_key_violation(&err) {
            PlaneError::NotFound("user")
        } else {
            PlaneError::from(err)
        }
    })?;

    info!(environment_id = %id, "environment created");
    Ok(id)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnvironmentValue {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: BindingType,
}

fn is_valid_binding_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Inserts or replaces a binding of an environment.
///
/// A `storage` binding must hold the id of a storage config owned by the
/// environment's owner.
///
/// # Errors
/// Returns [`PlaneError::InvalidInput`] for a malformed key or storage
/// reference, [`PlaneError::NotFound`] for a foreign or missing environment or
/// a missing storage config, [`PlaneError::OwnershipMismatch`] for a foreign
/// storage config, or a database error.
#[instrument(
    skip(pool, binding),
    fields(key = %binding.key, value_type = binding.value_type.as_str())
)]
pub async fn set_environment_value(
    pool: &PgPool,
    owner_id: Uuid,
    environment_id: Uuid,
    binding: EnvironmentValue,
) -> Result<(), PlaneError> {
    if !is_valid_binding_key(&binding.key) {
        return Err(PlaneError::InvalidInput(
            "binding keys use letters, digits and underscores",
        ));
    }

    let mut tx = pool.begin().await?;

    let env_owner = environment_owner(&mut tx, environment_id).await?;
    if env_owner != owner_id {
        return Err(PlaneError::NotFound("environment"));
    }

    if binding.value_type == BindingType::Storage {
        let storage_id = Uuid::parse_str(binding.value.trim()).map_err(|_| {
            PlaneError::InvalidInput("storage bindings must reference a storage config id")
        })?;
        let storage_owner: Uuid =
            sqlx::query_scalar("SELECT user_id FROM storage_configs WHERE id = $1")
                .bind(storage_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(PlaneError::NotFound("storage config"))?;
        ensure_same_owner(env_owner, storage_owner, "storage config")?;
    }

    sqlx::query(
        r"
        INSERT INTO environment_values (environment_id, key, value, type)
        VALUES ($1, $2, $3, $4::binding_type)
        ON CONFLICT (environment_id, key)
        DO UPDATE SET value = EXCLUDED.value, type = EXCLUDED.type
        ",
    )
    .bind(environment_id)
    .bind(&binding.key)
    .bind(binding.value.trim())
    .bind(binding.value_type.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(%environment_id, "environment value set");
    Ok(())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DomainRecord {
    pub name: String,
    pub target: DomainTarget,
}

/// Points a custom domain at a worker or project owned by `owner_id`.
///
/// # Errors
/// Returns [`PlaneError::InvalidName`], [`PlaneError::NotFound`] for a foreign
/// or missing target, or [`PlaneError::DomainConflict`].
#[instrument(skip(pool))]
pub async fn add_domain(
    pool: &PgPool,
    owner_id: Uuid,
    domain: &str,
    target: DomainTarget,
) -> Result<DomainRecord, PlaneError> {
    let name = names::normalize_domain(domain)?;

    let (target_owner, worker_id, project_id) = match target {
        DomainTarget::Worker(id) => (
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM workers WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?,
            Some(id),
            None,
        ),
        DomainTarget::Project(id) => (
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM projects WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?,
            None,
            Some(id),
        ),
    };
    let entity = match target {
        DomainTarget::Worker(_) => "worker",
        DomainTarget::Project(_) => "project",
    };
    if target_owner != Some(owner_id) {
        return Err(PlaneError::NotFound(entity));
    }

    sqlx::query(
        r"
        INSERT INTO domains (name, user_id, worker_id, project_id)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(&name)
    .bind(owner_id)
    .bind(worker_id)
    .bind(project_id)
    .execute(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            PlaneError::DomainConflict(name.clone())
        } else if is_foreign_key_violation(&err) {
            // Target deleted between the ownership check and the insert.
            PlaneError::NotFound(entity)
        } else {
            PlaneError::from(err)
        }
    })?;

    info!(domain = %name, ?target, "domain added");
    Ok(DomainRecord { name, target })
}
