//! Application-scoped sandbox service: the pool, one executor per language,
//! and the explicit start/shutdown lifecycle the host process drives.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::executor::{ExecuteError, ExecutionRequest, ExecutorRegistry, LanguageExecutor};
use crate::language::Language;
use crate::lifecycle::{CleanupCoordinator, CleanupReport};
use crate::result::ExecutionResult;
use crate::sandbox::{ContainerPool, ContainerRuntime, SandboxError};

/// Startup and shutdown policy.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Remove leftover containers on `start`.
    pub prune_on_start: bool,
    /// Create every container on `start`.
    pub prewarm: bool,
    /// Overall bound for cleanup.
    pub cleanup_timeout: Duration,
    /// Bound for tearing down one container.
    pub per_container_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            prune_on_start: true,
            prewarm: false,
            cleanup_timeout: Duration::from_secs(10),
            per_container_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything the HTTP layer needs to execute code.
#[derive(Debug)]
pub struct SandboxService {
    pool: Arc<ContainerPool>,
    executors: ExecutorRegistry,
    coordinator: CleanupCoordinator,
    options: LifecycleOptions,
}

impl SandboxService {
    /// Wires a pool and one executor per language from configuration.
    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Result<Self> {
        let pool = Arc::new(ContainerPool::new(runtime, config.pool_settings()?));
        let settings = config.executor_settings();

        let mut executors = ExecutorRegistry::new();
        for language in Language::ALL {
            executors.register(LanguageExecutor::new(
                language,
                config.languages.image(language),
                Arc::clone(&pool),
                settings.clone(),
            ));
        }

        let options = LifecycleOptions {
            prune_on_start: config.cleanup.prune_on_start,
            prewarm: config.sandbox.prewarm,
            cleanup_timeout: Duration::from_secs(config.cleanup.timeout_secs),
            per_container_timeout: Duration::from_secs(config.cleanup.per_container_timeout_secs),
        };

        Ok(Self::new(pool, executors, options))
    }

    /// Assembles a service from already-built parts.
    pub fn new(pool: Arc<ContainerPool>, executors: ExecutorRegistry, options: LifecycleOptions) -> Self {
        let coordinator = CleanupCoordinator::new(
            Arc::clone(&pool),
            executors.languages(),
            options.per_container_timeout,
        );
        Self {
            pool,
            executors,
            coordinator,
            options,
        }
    }

    /// Startup housekeeping. Failures are logged, never fatal: the pool
    /// creates containers lazily anyway.
    pub async fn start(&self) {
        if let Err(e) = self.pool.runtime().ping().await {
            warn!("Container runtime is not reachable yet: {}", e);
            return;
        }

        if self.options.prune_on_start {
            match self.pool.prune_orphans().await {
                Ok(removed) => info!(removed, "Startup prune finished"),
                Err(e) => warn!("Failed to prune orphaned containers: {}", e),
            }
        }

        if self.options.prewarm {
            self.prewarm().await;
        }
    }

    /// Creates every language's container up front. Returns how many are ready.
    pub async fn prewarm(&self) -> usize {
        let mut ready = 0;
        for executor in self.executors.iter() {
            match self.pool.acquire(executor.language(), executor.image()).await {
                Ok(info) => {
                    ready += 1;
                    info!(
                        language = %executor.language(),
                        container_id = %info.short_id(),
                        "Prewarmed container"
                    );
                }
                Err(e) => warn!(language = %executor.language(), "Prewarm failed: {}", e),
            }
        }
        ready
    }

    /// Final teardown. Idempotent.
    pub async fn shutdown(&self) -> CleanupReport {
        self.coordinator.shutdown(self.options.cleanup_timeout).await
    }

    /// On-demand teardown; containers are recreated by the next request.
    pub async fn cleanup(&self) -> CleanupReport {
        self.coordinator.cleanup(self.options.cleanup_timeout).await
    }

    /// Executes a request with the executor of its language.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        if self.coordinator.is_shut_down() {
            return Err(SandboxError::container_failed("sandbox is shutting down").into());
        }
        self.executors.execute(request).await
    }

    /// Languages with a registered executor.
    pub fn languages(&self) -> Vec<Language> {
        self.executors.languages()
    }

    /// Per-language container summary.
    pub async fn container_status(&self) -> BTreeMap<Language, String> {
        self.pool.status().await
    }

    /// The shared container pool.
    pub fn pool(&self) -> &Arc<ContainerPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::{MockExec, MockRuntime};

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.sandbox.work_root = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_from_config_registers_all_languages() {
        let dir = tempfile::tempdir().unwrap();
        let service =
            SandboxService::from_config(Arc::new(MockRuntime::new()), &config_in(dir.path())).unwrap();

        assert_eq!(service.languages(), Language::ALL.to_vec());
        assert!(service
            .container_status()
            .await
            .values()
            .all(|s| s == "no container"));
    }

    #[tokio::test]
    async fn test_start_prunes_and_prewarms() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_orphan("crashed-run");
        let mut config = config_in(dir.path());
        config.sandbox.prewarm = true;

        let service = SandboxService::from_config(runtime.clone(), &config).unwrap();
        service.start().await;

        assert!(runtime.is_removed("crashed-run"));
        assert_eq!(service.pool().pooled_count().await, 3);
    }

    #[tokio::test]
    async fn test_start_tolerates_unreachable_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let service = SandboxService::from_config(
            Arc::new(MockRuntime::new().unavailable()),
            &config_in(dir.path()),
        )
        .unwrap();

        service.start().await;
        assert_eq!(service.pool().pooled_count().await, 0);
    }

    #[tokio::test]
    async fn test_prewarm_counts_failures_out() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::new().without_images().failing_pulls());
        let service = SandboxService::from_config(runtime, &config_in(dir.path())).unwrap();

        assert_eq!(service.prewarm().await, 0);
        assert_eq!(service.pool().pooled_count().await, 0);
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(MockRuntime::new().with_exec(|_| MockExec::stdout("hi")));
        let service = SandboxService::from_config(runtime, &config_in(dir.path())).unwrap();
        let request = ExecutionRequest::new(Language::Python, "print('hi')");

        service.execute(&request).await.unwrap();
        let report = service.shutdown().await;
        let refused = service.execute(&request).await;

        assert_eq!(report.containers, 1);
        assert!(matches!(refused, Err(ExecuteError::ContainerUnavailable(_))));
        assert_eq!(service.shutdown().await.containers, 0);
    }
}
