//! Typed failures of control-plane writes.
//!
//! Every invariant violation is rejected synchronously inside the write
//! transaction and surfaces as one of these variants; nothing is repaired
//! after the fact.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("name '{0}' is already taken")]
    NameConflict(String),
    #[error("owner does not match the linked {0}")]
    OwnershipMismatch(&'static str),
    #[error("project members must share the project environment")]
    EnvironmentMismatch,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("worker already belongs to a project")]
    AlreadyInProject,
    #[error("the main worker of a project can only be removed with its project")]
    MainWorkerProtected,
    #[error("invalid name '{0}': use lowercase letters, digits and inner hyphens")]
    InvalidName(String),
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidRoute { pattern: String, reason: String },
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("route pattern '{0}' is already used in this project")]
    RouteConflict(String),
    #[error("domain '{0}' is already registered")]
    DomainConflict(String),
    #[error("a concurrent write holds this entity; retry later")]
    ConcurrentWrite,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl PlaneError {
    /// Short machine-readable code returned to control-plane callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NameConflict(_) => "name_conflict",
            Self::OwnershipMismatch(_) => "ownership_mismatch",
            Self::EnvironmentMismatch => "environment_mismatch",
            Self::NotFound(_) => "not_found",
            Self::AlreadyInProject => "already_in_project",
            Self::MainWorkerProtected => "main_worker_protected",
            Self::InvalidName(_) => "invalid_name",
            Self::InvalidRoute { .. } => "invalid_route",
            Self::InvalidInput(_) => "invalid_input",
            Self::RouteConflict(_) => "route_conflict",
            Self::DomainConflict(_) => "domain_conflict",
            Self::ConcurrentWrite => "concurrent_write",
            Self::Database(_) => "internal",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NameConflict(_)
            | Self::AlreadyInProject
            | Self::RouteConflict(_)
            | Self::DomainConflict(_)
            | Self::ConcurrentWrite => StatusCode::CONFLICT,
            Self::OwnershipMismatch(_) => StatusCode::FORBIDDEN,
            Self::EnvironmentMismatch | Self::MainWorkerProtected => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidName(_) | Self::InvalidRoute { .. } | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Lock contention and serialization failures become [`PlaneError::ConcurrentWrite`];
/// everything else stays a database error for the caller to classify further.
impl From<sqlx::Error> for PlaneError {
    fn from(err: sqlx::Error) -> Self {
        if is_concurrency_failure(&err) {
            Self::ConcurrentWrite
        } else {
            Self::Database(err)
        }
    }
}

impl IntoResponse for PlaneError {
    /// Database errors are logged server-side and surface as `500` without details.
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Database(err) = &self {
            error!("Database error: {err}");
            return status.into_response();
        }
        let body = axum::Json(serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNIQUE_VIOLATION)
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(FOREIGN_KEY_VIOLATION)
}

pub(crate) fn is_check_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(CHECK_VIOLATION)
}

pub(crate) fn is_concurrency_failure(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE)
    )
}
