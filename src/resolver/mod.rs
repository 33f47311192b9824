//! Request resolution: `(identity, path)` to a dispatch target.
//!
//! Resolution is a single pass over a priority cascade; the first applicable
//! branch decides and nothing is retried:
//!
//! 1) An explicit worker id resolves to that worker, bypassing routes.
//! 2) A subdomain is looked up in the name registry (project entries win).
//! 3) A custom domain is looked up in the domain table.
//! 4) No identity is unresolved.
//!
//! A name or domain that lands on a project member worker routes through its
//! project like the project itself; only standalone workers skip routes.
//!
//! A project then selects a route for the path. A storage route additionally
//! needs the `ASSETS` storage binding of the main worker's environment; without
//! it the request fails as [`Resolution::BindingMissing`] and never falls back
//! to a worker route.
//!
//! The resolver never writes. Read failures surface as
//! [`ResolveError::Database`] for the caller to map, not retried here.

mod source;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

pub use source::{EndpointSource, PgSnapshot};

use crate::{
    model::{BindingType, EndpointKind},
    plane::{names, registry},
    routing::{RouteCache, RouteTable, RouteTarget, TieBreak},
};

/// Who a request is addressed to. The first populated field wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub worker_id: Option<Uuid>,
    pub subdomain: Option<String>,
    pub domain: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn worker(worker_id: Uuid) -> Self {
        Self {
            worker_id: Some(worker_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn subdomain(name: impl Into<String>) -> Self {
        Self {
            subdomain: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn domain(name: impl Into<String>) -> Self {
        Self {
            domain: Some(name.into()),
            ..Self::default()
        }
    }

    /// Classifies a `Host` header. `<name>.<platform_domain>` is a subdomain
    /// (one label only); the bare platform domain carries no identity; any
    /// other host is a custom domain.
    #[must_use]
    pub fn from_host(host: &str, platform_domain: &str) -> Self {
        let host = names::fold_domain(host);
        let platform = names::fold_domain(platform_domain);
        if host.is_empty() || host == platform {
            return Self::default();
        }
        if let Some(label) = host
            .strip_suffix(platform.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            && !platform.is_empty()
        {
            if label.is_empty() || label.contains('.') {
                return Self::default();
            }
            return Self::subdomain(label);
        }
        Self::domain(host)
    }
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// A standalone worker, or any worker addressed by explicit id.
    Worker { worker_id: Uuid },
    /// A project route backed by a worker.
    ProjectWorker { project_id: Uuid, worker_id: Uuid },
    /// A project route backed by the project's assets storage.
    ProjectStorage {
        project_id: Uuid,
        storage_config_id: Uuid,
    },
    /// The project exists but no route matches the path.
    NoRoute { project_id: Uuid },
    /// No endpoint answers to the identity.
    Unresolved,
    /// A storage route matched but the project has no usable `ASSETS` binding.
    BindingMissing { project_id: Uuid },
}

impl Resolution {
    /// `true` for the shapes the dispatch layer can serve.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            Self::Worker { .. } | Self::ProjectWorker { .. } | Self::ProjectStorage { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("ambiguous route in project {project_id}: {patterns:?}")]
    AmbiguousRoute {
        project_id: Uuid,
        patterns: Vec<String>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Resolves requests and keeps compiled route tables across calls.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: RouteCache,
    tie_break: TieBreak,
}

/// Prefixes a missing leading slash and drops any query string.
fn normalize_path(path: &str) -> String {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

impl Resolver {
    #[must_use]
    pub fn new(tie_break: TieBreak) -> Self {
        Self {
            cache: RouteCache::new(),
            tie_break,
        }
    }

    #[must_use]
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    #[must_use]
    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Resolves against a fresh read-only snapshot of `pool`.
    ///
    /// # Errors
    /// Returns [`ResolveError::Database`] when the snapshot cannot be read and
    /// [`ResolveError::AmbiguousRoute`] under [`TieBreak::Reject`].
    pub async fn resolve(
        &self,
        pool: &sqlx::PgPool,
        identity: &Identity,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        if *identity == Identity::default() {
            return Ok(Resolution::Unresolved);
        }
        let mut snapshot = PgSnapshot::begin(pool).await?;
        let resolution = self.resolve_with(&mut snapshot, identity, path).await?;
        snapshot.finish().await?;
        Ok(resolution)
    }

    /// Resolves against any [`EndpointSource`].
    ///
    /// # Errors
    /// Same as [`Resolver::resolve`].
    #[instrument(skip(self, source), fields(tie_break = %self.tie_break))]
    pub async fn resolve_with<S: EndpointSource>(
        &self,
        source: &mut S,
        identity: &Identity,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        if let Some(worker_id) = identity.worker_id {
            if source.worker_exists(worker_id).await? {
                debug!(%worker_id, "explicit worker reference");
                return Ok(Resolution::Worker { worker_id });
            }
            debug!(%worker_id, "explicit worker not found");
            return Ok(Resolution::Unresolved);
        }

        let entry = if let Some(subdomain) = identity.subdomain.as_deref() {
            let name = names::fold(subdomain);
            let entries = source.endpoints_named(&name).await?;
            let Some(entry) = registry::pick_endpoint(entries) else {
                debug!(%name, "subdomain not registered");
                return Ok(Resolution::Unresolved);
            };
            entry
        } else if let Some(domain) = identity.domain.as_deref() {
            let domain = names::fold_domain(domain);
            let Some(entry) = source.domain_endpoint(&domain).await? else {
                debug!(%domain, "domain not registered");
                return Ok(Resolution::Unresolved);
            };
            entry
        } else {
            return Ok(Resolution::Unresolved);
        };

        let project_id = match (entry.kind, entry.project_id) {
            (EndpointKind::Project, _) => entry.id,
            (EndpointKind::Worker, Some(project_id)) => project_id,
            (EndpointKind::Worker, None) => {
                debug!(worker_id = %entry.id, "standalone worker");
                return Ok(Resolution::Worker {
                    worker_id: entry.id,
                });
            }
        };

        self.route_project(source, project_id, &normalize_path(path))
            .await
    }

    async fn route_project<S: EndpointSource>(
        &self,
        source: &mut S,
        project_id: Uuid,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        let Some(revision) = source.routes_revision(project_id).await? else {
            debug!(%project_id, "project vanished");
            return Ok(Resolution::Unresolved);
        };
        let table = self.table(source, project_id, revision).await?;

        let selected = table
            .select(path, self.tie_break)
            .map_err(|err| ResolveError::AmbiguousRoute {
                project_id,
                patterns: err.patterns,
            })?;
        let Some(route) = selected else {
            debug!(%project_id, path, "no route");
            return Ok(Resolution::NoRoute { project_id });
        };
        debug!(%project_id, path, pattern = route.pattern(), "route selected");

        match route.target() {
            RouteTarget::Worker(worker_id) => Ok(Resolution::ProjectWorker {
                project_id,
                worker_id,
            }),
            RouteTarget::Storage => {
                let storage_config_id = source
                    .assets_binding(project_id)
                    .await?
                    .filter(|binding| binding.value_type == Some(BindingType::Storage))
                    .and_then(|binding| Uuid::parse_str(binding.value.trim()).ok());
                match storage_config_id {
                    Some(storage_config_id) => Ok(Resolution::ProjectStorage {
                        project_id,
                        storage_config_id,
                    }),
                    None => {
                        debug!(%project_id, "storage route without assets binding");
                        Ok(Resolution::BindingMissing { project_id })
                    }
                }
            }
        }
    }

    async fn table<S: EndpointSource>(
        &self,
        source: &mut S,
        project_id: Uuid,
        revision: i64,
    ) -> Result<Arc<RouteTable>, ResolveError> {
        if let Some(table) = self.cache.get(project_id, revision) {
            return Ok(table);
        }
        let records = source.project_routes(project_id).await?;
        let table = RouteTable::compile(project_id, revision, records);
        debug!(%project_id, revision, routes = table.len(), "route table compiled");
        Ok(self.cache.insert(table))
    }
}
