//! Caller identity for control-plane endpoints.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user id in `x-owner-id`. Handlers only see resources owned by that user.

use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Clone, Copy, Debug)]
pub struct Principal {
    pub owner_id: Uuid,
}

/// Reads the caller from `x-owner-id`, or returns 401 when it is missing or malformed.
pub fn require_owner(headers: &HeaderMap) -> Result<Principal, StatusCode> {
    headers
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(|owner_id| Principal { owner_id })
        .ok_or(StatusCode::UNAUTHORIZED)
}
