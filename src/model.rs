//! Records shared between the write side (`plane`) and the read side
//! (`resolver`, `routing`).
//!
//! Enum values mirror the text form stored in Postgres; reads cast enums with
//! `::text` and parse them back through `parse`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Environment key the resolver reads for storage-backed routes.
pub const ASSETS_KEY: &str = "ASSETS";

/// Pattern of the catch-all route every project starts with.
pub const CATCH_ALL_PATTERN: &str = "/*";

/// Priority of the catch-all route; it is the only route kept across redeploys.
pub const CATCH_ALL_PRIORITY: i32 = 0;

/// Priority given to routes pointing at function workers.
pub const FUNCTION_ROUTE_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Worker,
    Project,
}

impl EndpointKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Project => "project",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "worker" => Some(Self::Worker),
            "project" => Some(Self::Project),
            _ => None,
        }
    }
}

/// One entry of the merged worker/project name space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointRecord {
    pub kind: EndpointKind,
    pub id: Uuid,
    /// Project the worker belongs to; always `None` for project entries.
    pub project_id: Option<Uuid>,
}

/// What a custom domain points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum DomainTarget {
    Worker(Uuid),
    Project(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RouteBackend {
    Worker,
    Storage,
}

impl RouteBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Storage => "storage",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "worker" => Some(Self::Worker),
            "storage" => Some(Self::Storage),
            _ => None,
        }
    }
}

/// A stored route row as read back for compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub pattern: String,
    pub priority: i32,
    pub backend: RouteBackend,
    pub worker_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BindingType {
    Var,
    Secret,
    Storage,
    Kv,
    Database,
    Worker,
}

impl BindingType {
    /// Returns the canonical string used in API payloads and SQL writes.
    /// Must match the `binding_type` enum values in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Secret => "secret",
            Self::Storage => "storage",
            Self::Kv => "kv",
            Self::Database => "database",
            Self::Worker => "worker",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "var" => Some(Self::Var),
            "secret" => Some(Self::Secret),
            "storage" => Some(Self::Storage),
            "kv" => Some(Self::Kv),
            "database" => Some(Self::Database),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }
}

/// Raw binding as stored in an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub value: String,
    pub value_type: Option<BindingType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    #[default]
    Javascript,
    Typescript,
    Wasm,
}

impl CodeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Wasm => "wasm",
        }
    }
}
