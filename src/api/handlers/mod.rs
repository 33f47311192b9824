//! Route handlers.
//!
//! `resolve` serves the edge on every request; the rest is the control-plane
//! management surface, scoped to the caller named in `x-owner-id`.

pub mod domains;
pub mod environments;
pub mod health;
pub mod principal;
pub mod projects;
pub mod resolve;
pub mod storage;
pub mod types;
pub mod users;
pub mod workers;
