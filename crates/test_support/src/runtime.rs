//! Locates a Docker-compatible socket for testcontainers.
//!
//! Order: `DOCKER_HOST` as given, the Docker socket, then rootless and rootful
//! Podman sockets (exported through `DOCKER_HOST` when picked).

use anyhow::{Result, bail};
use std::{
    env, fs,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

const SOCKET_WAIT: Duration = Duration::from_secs(3);
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Ensures testcontainers can reach a container runtime. The probe runs once
/// per test binary; later calls return the cached verdict.
///
/// # Errors
/// Returns an error describing every socket that was tried.
pub fn ensure_container_runtime() -> Result<()> {
    static VERDICT: OnceLock<Result<(), String>> = OnceLock::new();
    match VERDICT.get_or_init(probe) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn probe() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return match docker_host.strip_prefix("unix://") {
            Some(path) if !wait_for_socket(Path::new(path)) => Err(format!(
                "`DOCKER_HOST` points to `{docker_host}`, but nothing is listening there"
            )),
            _ => Ok(()),
        };
    }

    let mut tried = Vec::new();
    for candidate in socket_candidates() {
        if wait_for_socket(&candidate) {
            if candidate != Path::new(DOCKER_SOCKET) {
                export_docker_host(&candidate);
            }
            return Ok(());
        }
        tried.push(candidate.display().to_string());
    }

    Err(format!(
        "no container runtime socket is reachable (tried: {}); start Docker or `podman.socket`, or set `DOCKER_HOST`",
        tried.join(", ")
    ))
}

fn socket_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(DOCKER_SOCKET)];
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    if let Some(uid) = current_uid() {
        candidates.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    candidates.push(PathBuf::from("/run/podman/podman.sock"));
    candidates.dedup();
    candidates
}

fn wait_for_socket(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let start = Instant::now();
    while start.elapsed() < SOCKET_WAIT {
        if UnixStream::connect(path).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}

fn export_docker_host(path: &Path) {
    // SAFETY: called once, inside the OnceLock initializer, before any container starts.
    unsafe {
        env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
    }
}

fn current_uid() -> Option<u32> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}
