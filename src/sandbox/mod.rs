//! Container runtime abstraction and the per-language container pool.
//!
//! The pool and executors only ever talk to [`ContainerRuntime`]; the Docker
//! Engine client lives behind it in [`docker`], and [`mock`] provides a
//! scripted in-memory runtime for tests.

mod docker;
mod error;
pub mod mock;
mod pool;
mod workdir;

pub use docker::DockerRuntime;
pub use error::SandboxError;
pub use pool::{ContainerInfo, ContainerPool, PoolSettings, WorkDirGuard};
pub use workdir::{copy_dir_contents, wipe_dir_contents};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Label attached to every container the pool creates.
pub const MANAGED_LABEL: &str = "ojsandbox.managed";

/// Label carrying the language a pooled container serves.
pub const LANGUAGE_LABEL: &str = "ojsandbox.language";

/// Everything needed to create one long-lived sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Host directory bind-mounted read-write at `container_work_dir`.
    pub host_work_dir: PathBuf,
    /// Mount point and working directory inside the container.
    pub container_work_dir: String,
    /// Memory limit in bytes.
    pub memory_bytes: i64,
    /// CPU limit in units of 10^-9 CPUs.
    pub nano_cpus: i64,
    /// Maximum number of processes inside the container.
    pub pids_limit: i64,
    /// Size option for the scratch tmpfs mounted at `/tmp`.
    pub tmpfs_size: String,
    /// Labels used to find the container again after a crash.
    pub labels: HashMap<String, String>,
    /// Entry command; must never exit on its own.
    pub keepalive_cmd: Vec<String>,
}

/// Captured result of one `exec` call inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Process exit code, if the runtime reported one.
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Returns true if the process exited with status zero.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Appends `chunk` to `buf` without growing it past `limit` bytes, cutting on
/// a character boundary. Returns false once `buf` is full.
pub fn push_capped(buf: &mut String, chunk: &str, limit: usize) -> bool {
    let room = limit.saturating_sub(buf.len());
    if chunk.len() <= room {
        buf.push_str(chunk);
        return true;
    }
    let mut end = room;
    while !chunk.is_char_boundary(end) {
        end -= 1;
    }
    buf.push_str(&chunk[..end]);
    false
}

/// Narrow interface over a container engine.
///
/// Implementations must be cheap to share behind an `Arc`; every method may be
/// called concurrently for different containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns a short name for logs.
    fn name(&self) -> &'static str;

    /// Checks that the engine is reachable.
    async fn ping(&self) -> Result<(), SandboxError>;

    /// Returns true if the image is present locally.
    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError>;

    /// Pulls the image from its registry.
    async fn pull_image(&self, image: &str) -> Result<(), SandboxError>;

    /// Creates a container and returns its id. Does not start it.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Stops a running container, waiting at most `timeout_secs` before killing it.
    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), SandboxError>;

    /// Removes a container, forcing removal if it is still running.
    async fn remove_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Returns true if the container exists and is running.
    async fn is_running(&self, id: &str) -> Result<bool, SandboxError>;

    /// Runs a command inside the container and waits for it to finish.
    ///
    /// Stdout and stderr are each kept up to `output_limit` bytes. Output past
    /// the limit is read and discarded so the process never blocks on a full pipe.
    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        working_dir: &str,
        output_limit: usize,
    ) -> Result<ExecOutput, SandboxError>;

    /// Returns the container's current memory usage in bytes, if known.
    async fn memory_usage(&self, id: &str) -> Result<Option<u64>, SandboxError>;

    /// Lists ids of containers carrying [`MANAGED_LABEL`], running or not.
    async fn list_managed(&self) -> Result<Vec<String>, SandboxError>;
}

/// Parse memory limit string (e.g., "8g", "512m", "64k") to bytes
pub fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.trim().to_lowercase();

    if let Some(num) = limit.strip_suffix('g') {
        num.parse::<i64>().ok().map(|gigs| gigs * 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        num.parse::<i64>().ok().map(|megs| megs * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('k') {
        num.parse::<i64>().ok().map(|kilos| kilos * 1024)
    } else {
        limit.parse().ok()
    }
}

/// Parse a CPU count string (e.g., "1", "0.5") to nano-CPUs
#[allow(clippy::cast_possible_truncation)]
pub fn parse_cpu_limit(cpus: &str) -> Option<i64> {
    cpus.trim()
        .parse::<f64>()
        .ok()
        .filter(|c| *c > 0.0)
        .map(|c| (c * 1_000_000_000.0) as i64)
}
