//! Scripted in-memory container runtime.
//!
//! Lets the pool, executors, cleanup coordinator and HTTP layer be exercised
//! without a Docker daemon. Exec results come from a handler closure that sees
//! the full command line, so a test can script compile and run steps apart.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{push_capped, ContainerRuntime, ContainerSpec, ExecOutput, SandboxError};

/// What a scripted exec call does.
#[derive(Debug, Clone)]
pub enum MockExec {
    /// Finish immediately with this output.
    Output(ExecOutput),
    /// Finish with this output after a delay.
    Delayed(Duration, ExecOutput),
    /// Never finish.
    Hang,
    /// Fail at the runtime level.
    Fail(String),
}

impl MockExec {
    /// Exit 0 with the given stdout.
    pub fn stdout(text: &str) -> Self {
        Self::Output(ExecOutput {
            stdout: text.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    /// Exit with `code` and the given stderr.
    pub fn exit(code: i64, stderr: &str) -> Self {
        Self::Output(ExecOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        })
    }
}

type ExecHandler = Arc<dyn Fn(&str) -> MockExec + Send + Sync>;

#[derive(Debug, Default)]
struct MockContainer {
    running: bool,
    removed: bool,
}

#[derive(Debug, Default)]
struct MockState {
    images: HashSet<String>,
    containers: HashMap<String, MockContainer>,
    execs: Vec<String>,
}

/// In-memory [`ContainerRuntime`] with scripted exec behaviour.
pub struct MockRuntime {
    state: Mutex<MockState>,
    handler: ExecHandler,
    all_images_present: bool,
    fail_pulls: bool,
    unavailable: bool,
    memory_bytes: Option<u64>,
    remove_delay: Option<Duration>,
    create_delay: Option<Duration>,
    memory_delay: Option<Duration>,
    created: AtomicUsize,
    pulled: AtomicUsize,
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRuntime")
            .field("created", &self.created_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// A runtime where every image exists and every exec prints nothing and exits 0.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            handler: Arc::new(|_| MockExec::stdout("")),
            all_images_present: true,
            fail_pulls: false,
            unavailable: false,
            memory_bytes: Some(32 * 1024 * 1024),
            remove_delay: None,
            create_delay: None,
            memory_delay: None,
            created: AtomicUsize::new(0),
            pulled: AtomicUsize::new(0),
        }
    }

    /// Scripts exec results from the space-joined command line.
    #[must_use]
    pub fn with_exec<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> MockExec + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// No image exists until it is pulled.
    #[must_use]
    pub fn without_images(mut self) -> Self {
        self.all_images_present = false;
        self
    }

    /// Every pull fails.
    #[must_use]
    pub fn failing_pulls(mut self) -> Self {
        self.fail_pulls = true;
        self
    }

    /// Every call fails as if the daemon were down.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Memory usage reported for every container.
    #[must_use]
    pub fn with_memory(mut self, bytes: Option<u64>) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Makes `remove_container` take this long.
    #[must_use]
    pub fn with_remove_delay(mut self, delay: Duration) -> Self {
        self.remove_delay = Some(delay);
        self
    }

    /// Makes `create_container` take this long.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Makes `memory_usage` take this long, like a slow stats endpoint.
    #[must_use]
    pub fn with_memory_delay(mut self, delay: Duration) -> Self {
        self.memory_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), SandboxError> {
        if self.unavailable {
            Err(SandboxError::docker_unavailable("mock daemon is down"))
        } else {
            Ok(())
        }
    }

    /// Number of containers created so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of image pulls so far.
    pub fn pull_count(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Simulates the container being killed from outside.
    pub fn kill(&self, id: &str) {
        if let Some(container) = self.lock().containers.get_mut(id) {
            container.running = false;
        }
    }

    /// Registers a labelled container this process never created.
    pub fn add_orphan(&self, id: &str) {
        self.lock().containers.insert(
            id.to_string(),
            MockContainer {
                running: true,
                removed: false,
            },
        );
    }

    /// Returns true if the container was removed.
    pub fn is_removed(&self, id: &str) -> bool {
        self.lock().containers.get(id).is_some_and(|c| c.removed)
    }

    /// Number of containers that exist and have not been removed.
    pub fn live_count(&self) -> usize {
        self.lock().containers.values().filter(|c| !c.removed).count()
    }

    /// Every exec command line seen so far, in order.
    pub fn exec_log(&self) -> Vec<String> {
        self.lock().execs.clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> Result<(), SandboxError> {
        self.check_available()
    }

    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError> {
        self.check_available()?;
        Ok(self.all_images_present || self.lock().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        self.check_available()?;
        self.pulled.fetch_add(1, Ordering::SeqCst);
        if self.fail_pulls {
            return Err(SandboxError::image_pull_failed(image, "pull access denied"));
        }
        self.lock().images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        self.check_available()?;
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock{n:04}{}", spec.name.replace('-', ""));
        self.lock().containers.insert(id.clone(), MockContainer::default());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.check_available()?;
        match self.lock().containers.get_mut(id) {
            Some(container) if !container.removed => {
                container.running = true;
                Ok(())
            }
            _ => Err(SandboxError::container_unhealthy(format!("no such container: {id}"))),
        }
    }

    async fn stop_container(&self, id: &str, _timeout_secs: i64) -> Result<(), SandboxError> {
        self.check_available()?;
        if let Some(container) = self.lock().containers.get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        self.check_available()?;
        if let Some(delay) = self.remove_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(container) = self.lock().containers.get_mut(id) {
            container.running = false;
            container.removed = true;
        }
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<bool, SandboxError> {
        self.check_available()?;
        Ok(self
            .lock()
            .containers
            .get(id)
            .is_some_and(|c| c.running && !c.removed))
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        _working_dir: &str,
        output_limit: usize,
    ) -> Result<ExecOutput, SandboxError> {
        self.check_available()?;
        let line = cmd.join(" ");
        {
            let mut state = self.lock();
            let running = state.containers.get(id).is_some_and(|c| c.running && !c.removed);
            if !running {
                return Err(SandboxError::container_unhealthy(format!(
                    "container {id} is not running"
                )));
            }
            state.execs.push(line.clone());
        }

        let output = match (self.handler)(&line) {
            MockExec::Output(output) => output,
            MockExec::Delayed(delay, output) => {
                tokio::time::sleep(delay).await;
                output
            }
            MockExec::Hang => std::future::pending().await,
            MockExec::Fail(message) => return Err(SandboxError::container_failed(message)),
        };

        let mut capped = ExecOutput {
            exit_code: output.exit_code,
            ..ExecOutput::default()
        };
        push_capped(&mut capped.stdout, &output.stdout, output_limit);
        push_capped(&mut capped.stderr, &output.stderr, output_limit);
        Ok(capped)
    }

    async fn memory_usage(&self, _id: &str) -> Result<Option<u64>, SandboxError> {
        self.check_available()?;
        if let Some(delay) = self.memory_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.memory_bytes)
    }

    async fn list_managed(&self) -> Result<Vec<String>, SandboxError> {
        self.check_available()?;
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| !c.removed)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "python:3.11-slim".to_string(),
            host_work_dir: std::env::temp_dir(),
            container_work_dir: "/sandbox".to_string(),
            memory_bytes: 1,
            nano_cpus: 1,
            pids_limit: 1,
            tmpfs_size: "1m".to_string(),
            labels: HashMap::new(),
            keepalive_cmd: vec!["sleep".to_string(), "infinity".to_string()],
        }
    }

    #[tokio::test]
    async fn test_mock_container_lifecycle() {
        let runtime = MockRuntime::new();
        let id = runtime.create_container(&spec("a")).await.unwrap();
        assert!(!runtime.is_running(&id).await.unwrap());

        runtime.start_container(&id).await.unwrap();
        assert!(runtime.is_running(&id).await.unwrap());

        runtime.remove_container(&id).await.unwrap();
        assert!(!runtime.is_running(&id).await.unwrap());
        assert!(runtime.is_removed(&id));
    }

    #[tokio::test]
    async fn test_mock_exec_uses_handler_and_logs() {
        let runtime = MockRuntime::new().with_exec(|cmd| {
            if cmd.contains("javac") {
                MockExec::exit(1, "Main.java:1: error: ';' expected")
            } else {
                MockExec::stdout("Hello")
            }
        });
        let id = runtime.create_container(&spec("b")).await.unwrap();
        runtime.start_container(&id).await.unwrap();

        let compile = runtime
            .exec(&id, vec!["javac".to_string(), "Main.java".to_string()], "/sandbox", LIMIT)
            .await
            .unwrap();
        let run = runtime
            .exec(&id, vec!["java".to_string(), "Main".to_string()], "/sandbox", LIMIT)
            .await
            .unwrap();

        assert_eq!(compile.exit_code, Some(1));
        assert_eq!(run.stdout, "Hello");
        assert_eq!(runtime.exec_log(), vec!["javac Main.java", "java Main"]);
    }

    #[tokio::test]
    async fn test_mock_exec_on_dead_container_fails() {
        let runtime = MockRuntime::new();
        let id = runtime.create_container(&spec("c")).await.unwrap();
        runtime.start_container(&id).await.unwrap();
        runtime.kill(&id);

        let result = runtime.exec(&id, vec!["true".to_string()], "/sandbox", LIMIT).await;
        assert!(matches!(result, Err(SandboxError::ContainerUnhealthy { .. })));
    }

    #[tokio::test]
    async fn test_mock_exec_caps_flooding_output() {
        let flood = "y\n".repeat(100_000);
        let runtime = MockRuntime::new().with_exec(move |_| MockExec::Output(ExecOutput {
            stdout: flood.clone(),
            stderr: flood.clone(),
            exit_code: Some(0),
        }));
        let id = runtime.create_container(&spec("d")).await.unwrap();
        runtime.start_container(&id).await.unwrap();

        let output = runtime
            .exec(&id, vec!["yes".to_string()], "/sandbox", LIMIT)
            .await
            .unwrap();

        assert_eq!(output.stdout.len(), LIMIT);
        assert_eq!(output.stderr.len(), LIMIT);
        assert!(output.succeeded());
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let runtime = MockRuntime::new().unavailable();
        assert!(runtime.ping().await.unwrap_err().is_docker_unavailable());
    }
}
