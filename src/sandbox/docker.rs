//! Docker Engine implementation of [`ContainerRuntime`].
//!
//! Containers are created with the work directory bind-mounted, networking
//! disabled, a tmpfs at `/tmp` and memory, CPU and pid limits. Commands run
//! through the exec API and their exit code is read back with an inspect.

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{push_capped, ContainerRuntime, ContainerSpec, ExecOutput, SandboxError, MANAGED_LABEL};

/// [`ContainerRuntime`] backed by the local Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the Docker daemon using the platform defaults
    /// (`DOCKER_HOST`, or the local unix socket).
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::docker_unavailable(format!("Failed to connect to Docker: {e}"))
        })?;
        Ok(Self { docker })
    }

    fn build_container_config(spec: &ContainerSpec) -> Result<ContainerConfig<String>, SandboxError> {
        let host_dir = spec.host_work_dir.to_str().ok_or_else(|| {
            SandboxError::container_failed(format!(
                "Work directory is not valid UTF-8: {}",
                spec.host_work_dir.display()
            ))
        })?;

        let binds = vec![format!("{host_dir}:{}:rw", spec.container_work_dir)];

        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/tmp".to_string(),
            format!("rw,nosuid,size={}", spec.tmpfs_size),
        );

        Ok(ContainerConfig {
            image: Some(spec.image.clone()),
            cmd: Some(spec.keepalive_cmd.clone()),
            working_dir: Some(spec.container_work_dir.clone()),
            labels: Some(spec.labels.clone()),
            network_disabled: Some(true),
            tty: Some(false),
            host_config: Some(HostConfig {
                binds: Some(binds),
                memory: Some(spec.memory_bytes),
                // Same value disables swap on top of the memory limit
                memory_swap: Some(spec.memory_bytes),
                nano_cpus: Some(spec.nano_cpus),
                pids_limit: Some(spec.pids_limit),
                network_mode: Some("none".to_string()),
                tmpfs: Some(tmpfs),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// Maps a bollard error onto the sandbox taxonomy.
fn map_err(context: &str, err: BollardError) -> SandboxError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } if status_code == 404 => {
            SandboxError::container_unhealthy(format!("{context}: {message}"))
        }
        BollardError::IOError { err } => {
            SandboxError::docker_unavailable(format!("{context}: {err}"))
        }
        BollardError::HyperResponseError { err } => {
            SandboxError::docker_unavailable(format!("{context}: {err}"))
        }
        other => SandboxError::container_failed(format!("{context}: {other}")),
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        self.docker.ping().await.map_err(|e| {
            SandboxError::docker_unavailable(format!("Cannot ping Docker daemon: {e}"))
        })?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_err("Failed to inspect image", e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        info!(image, "Pulling Docker image");

        let pull_options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(pull_options), None, None);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => {
                    if let Some(error) = output.error {
                        return Err(SandboxError::image_pull_failed(image, error));
                    }
                    if let Some(status) = output.status {
                        debug!(image, "{}", status.trim());
                    }
                }
                Err(e) => return Err(SandboxError::image_pull_failed(image, e.to_string())),
            }
        }

        info!(image, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        let config = Self::build_container_config(spec)?;

        debug!(name = %spec.name, image = %spec.image, "Creating container");
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| map_err("Failed to create container", e))?;

        for warning in &response.warnings {
            warn!(name = %spec.name, "Docker warning: {}", warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| map_err("Failed to start container", e))
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), SandboxError> {
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_err("Failed to stop container", e)),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(map_err("Failed to remove container", e)),
        }
    }

    async fn is_running(&self, id: &str) -> Result<bool, SandboxError> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(details
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_err("Failed to inspect container", e)),
        }
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        working_dir: &str,
        output_limit: usize,
    ) -> Result<ExecOutput, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(working_dir.to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_err("Failed to create exec", e))?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_err("Failed to start exec", e))?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        push_capped(&mut output.stdout, &String::from_utf8_lossy(&message), output_limit);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        push_capped(&mut output.stderr, &String::from_utf8_lossy(&message), output_limit);
                    }
                    Err(e) => {
                        warn!("Error reading exec output: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_err("Failed to inspect exec", e))?;
        output.exit_code = inspect.exit_code;

        Ok(output)
    }

    async fn memory_usage(&self, id: &str) -> Result<Option<u64>, SandboxError> {
        let mut stream = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );

        match stream.next().await {
            Some(Ok(stats)) => Ok(stats.memory_stats.usage),
            Some(Err(e)) => Err(map_err("Failed to read container stats", e)),
            None => Ok(None),
        }
    }

    async fn list_managed(&self) -> Result<Vec<String>, SandboxError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{MANAGED_LABEL}=true")]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| map_err("Failed to list containers", e))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_spec() -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        ContainerSpec {
            name: "ojsandbox-python-1234abcd".to_string(),
            image: "python:3.11-slim".to_string(),
            host_work_dir: PathBuf::from("/tmp/ojsandbox/python"),
            container_work_dir: "/sandbox".to_string(),
            memory_bytes: 512 * 1024 * 1024,
            nano_cpus: 1_000_000_000,
            pids_limit: 64,
            tmpfs_size: "64m".to_string(),
            labels,
            keepalive_cmd: vec!["sleep".to_string(), "infinity".to_string()],
        }
    }

    #[test]
    fn test_container_config_isolates_network_and_limits_resources() {
        let config = DockerRuntime::build_container_config(&sample_spec()).unwrap();
        let host = config.host_config.unwrap();

        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.memory_swap, Some(512 * 1024 * 1024));
        assert_eq!(host.nano_cpus, Some(1_000_000_000));
        assert_eq!(host.pids_limit, Some(64));
        assert_eq!(
            host.binds.unwrap(),
            vec!["/tmp/ojsandbox/python:/sandbox:rw".to_string()]
        );
        assert!(host.tmpfs.unwrap()["/tmp"].contains("size=64m"));
        assert_eq!(config.working_dir.as_deref(), Some("/sandbox"));
        assert_eq!(
            config.cmd.unwrap(),
            vec!["sleep".to_string(), "infinity".to_string()]
        );
    }

    #[test]
    fn test_not_found_maps_to_unhealthy() {
        let err = map_err(
            "Failed to inspect container",
            BollardError::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(matches!(err, SandboxError::ContainerUnhealthy { .. }));
    }

    #[tokio::test]
    async fn test_ping_no_docker() {
        // Passes whether or not a daemon is reachable in the test environment
        let Ok(runtime) = DockerRuntime::connect() else {
            return;
        };
        match runtime.ping().await {
            Ok(()) => {}
            Err(e) => assert!(e.is_docker_unavailable(), "Unexpected error: {e}"),
        }
    }
}
