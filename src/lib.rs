//! # Edgeplane (worker control plane and request resolver)
//!
//! `edgeplane` keeps the registry of deployable workers and multi-worker
//! projects, and answers one question on the request path: which worker, or
//! which static-asset storage, serves `(identity, path)`.
//!
//! ## Naming
//!
//! Workers and projects share one global name space. A project is backed by a
//! main worker that carries the project's id and name, so a name lookup may
//! return two entries; the project entry always wins. Names are folded to
//! lowercase `[a-z0-9-]` before they are stored or looked up.
//!
//! ## Routing
//!
//! Each project owns a route table. Patterns are literal paths or `*` / `**`
//! globs; the most specific match wins, then the higher priority, then the
//! configured tie-break. Storage routes serve from the `ASSETS` binding of the
//! main worker's environment.
//!
//! ## Consistency
//!
//! Writes run in one transaction each and take row locks in a fixed order
//! (worker, then project). Reads run in a read-only snapshot and never block
//! writers; compiled route tables are cached per project revision.

pub mod api;
pub mod cli;
pub mod model;
pub mod plane;
pub mod resolver;
pub mod routing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
