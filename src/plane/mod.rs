//! Control-plane writes.
//!
//! Workers and projects share one global name space; a project owns a route
//! table and a main worker with the project's id. Writes here hold every
//! invariant of that model at commit time:
//!
//! 1) Register names through [`registry`] under an advisory lock.
//! 2) Check ownership and environment links through [`ownership`].
//! 3) Perform the write and bump the project's route revision.
//! 4) Re-assert that project members inherit the project environment.
//!
//! Handlers only parse inputs and pick an operation; SQL lives in the
//! submodules.

pub mod error;
pub mod lifecycle;
pub mod manifest;
pub mod names;
pub mod ownership;
pub mod registry;
pub mod resources;

pub use error::PlaneError;
pub use lifecycle::{
    Deploy, DeployOutcome, FunctionWorkerSpec, ProjectRecord, StorageRoute, WorkerRecord,
    create_project, create_worker, delete_project, delete_worker, deploy_project,
    upgrade_worker_to_project,
};
pub use manifest::RoutesManifest;
pub use ownership::{EnvironmentLink, link_project_environment, link_worker_environment};
pub use resources::{
    DomainRecord, EnvironmentValue, NewStorageConfig, add_domain, create_environment,
    create_storage_config, create_user, set_environment_value,
};
