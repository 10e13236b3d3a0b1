//! Language executors.
//!
//! One generic [`LanguageExecutor`] drives every language; the per-language
//! differences live in [`LanguageProfile`]. An execution holds the
//! language's work-directory lock from injection until its last run, so
//! requests for the same language run one at a time while different
//! languages proceed in parallel.

mod error;
mod judge;
mod payload;
mod request;

pub use error::ExecuteError;
pub use judge::{classify, normalize_output, outputs_match};
pub use request::{ExecutionRequest, InputMode};

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::language::{Language, LanguageProfile};
use crate::result::{ExecutionMetrics, ExecutionResult, RunStatus};
use crate::sandbox::{ContainerInfo, ContainerPool, ExecOutput, SandboxError};

/// Tunables shared by every executor.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Wall-clock bound of a single run.
    pub run_timeout: Duration,
    /// Wall-clock bound of the compile step.
    pub compile_timeout: Duration,
    /// How often memory usage is sampled while a run is in flight.
    pub memory_sample_interval: Duration,
    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub max_output_bytes: usize,
    /// Largest run count a single request may ask for.
    pub max_execution_count: u32,
    /// Bound applied to the kill command issued after a timeout.
    pub kill_timeout: Duration,
    /// Where payload directories are staged before injection.
    pub payload_root: PathBuf,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(5),
            compile_timeout: Duration::from_secs(10),
            memory_sample_interval: Duration::from_millis(100),
            max_output_bytes: 64 * 1024,
            max_execution_count: 10,
            kill_timeout: Duration::from_secs(3),
            payload_root: std::env::temp_dir().join("ojsandbox").join("payloads"),
        }
    }
}

enum Bounded {
    Finished(ExecOutput),
    TimedOut,
}

/// Executes requests for one language inside its pooled container.
#[derive(Debug, Clone)]
pub struct LanguageExecutor {
    language: Language,
    profile: LanguageProfile,
    image: String,
    pool: Arc<ContainerPool>,
    settings: ExecutorSettings,
}

impl LanguageExecutor {
    /// Creates an executor for `language` running on `image`.
    pub fn new(
        language: Language,
        image: impl Into<String>,
        pool: Arc<ContainerPool>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            language,
            profile: language.profile(),
            image: image.into(),
            pool,
            settings,
        }
    }

    /// Language this executor serves.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Image the pooled container is created from.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Runs the request `repeat_count` times and aggregates the runs.
    ///
    /// Per-run failures (timeouts, compile and runtime errors) are recorded in
    /// the result. Only infrastructure failures return `Err`.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        if request.code.trim().is_empty() {
            return Err(ExecuteError::validation("code must not be empty"));
        }
        if request.language != self.language {
            return Err(ExecuteError::validation(format!(
                "{} request sent to the {} executor",
                request.language, self.language
            )));
        }
        if request.repeat_count > i64::from(self.settings.max_execution_count) {
            return Err(ExecuteError::validation(format!(
                "executionCount must be at most {}",
                self.settings.max_execution_count
            )));
        }

        let repeat = request.effective_repeat();
        let started = Instant::now();

        let _workdir = self.pool.lock_workdir(self.language).await;
        let container = self.pool.acquire(self.language, &self.image).await?;

        self.stage(&container, request).await?;

        let runs = match self.compile(&container).await? {
            Some(failure) => vec![failure; repeat],
            None => {
                let command = payload::run_command(&self.profile, request, self.settings.run_timeout);
                let mut runs = Vec::with_capacity(repeat);
                for i in 0..repeat {
                    let metrics = self
                        .run_once(&container, command.clone(), request.expected_output.as_deref())
                        .await?;
                    debug!(
                        language = %self.language,
                        run = i + 1,
                        status = %metrics.status,
                        duration_ms = metrics.duration_millis,
                        "Run finished"
                    );
                    runs.push(metrics);
                }
                runs
            }
        };

        let result = ExecutionResult::aggregate(runs)
            .ok_or_else(|| ExecuteError::validation("no runs were executed"))?;

        info!(
            language = %self.language,
            runs = repeat,
            success = result.success(),
            avg_ms = result.avg_duration_millis(),
            total_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Execution finished"
        );

        Ok(result)
    }

    /// Writes the payload and copies it into the container's work directory
    /// on the blocking pool.
    async fn stage(&self, container: &ContainerInfo, request: &ExecutionRequest) -> Result<usize, ExecuteError> {
        let pool = Arc::clone(&self.pool);
        let root = self.settings.payload_root.clone();
        let profile = self.profile;
        let request = request.clone();
        let container = container.clone();

        tokio::task::spawn_blocking(move || -> Result<usize, ExecuteError> {
            let payload =
                payload::write_payload(&root, &profile, &request).map_err(ExecuteError::Payload)?;
            Ok(pool.inject_code(&container, payload.path())?)
        })
        .await
        .map_err(|e| ExecuteError::Payload(io::Error::other(e)))?
    }

    /// Compiles the injected code. Returns the metrics every run should
    /// report if compilation failed.
    async fn compile(&self, container: &ContainerInfo) -> Result<Option<ExecutionMetrics>, SandboxError> {
        let Some(command) = payload::compile_command(&self.profile, self.settings.compile_timeout)
        else {
            return Ok(None);
        };

        let started = Instant::now();
        let outcome = self
            .exec_bounded(container, command, self.settings.compile_timeout, &mut 0)
            .await?;
        let duration_millis = elapsed_millis(started);

        let diagnostic = match outcome {
            Bounded::Finished(output) if output.succeeded() => return Ok(None),
            Bounded::Finished(output) => {
                let text = if output.stderr.trim().is_empty() {
                    output.stdout
                } else {
                    output.stderr
                };
                judge::truncate_output(text.trim().to_string(), self.settings.max_output_bytes)
            }
            Bounded::TimedOut => format!(
                "Compilation timed out after {} ms",
                self.settings.compile_timeout.as_millis()
            ),
        };

        warn!(language = %self.language, "Compilation failed");
        Ok(Some(ExecutionMetrics {
            status: RunStatus::CompilationError,
            output: String::new(),
            diagnostic,
            duration_millis,
            memory_bytes: 0,
            output_matched_expected: false,
        }))
    }

    async fn run_once(
        &self,
        container: &ContainerInfo,
        command: Vec<String>,
        expected: Option<&str>,
    ) -> Result<ExecutionMetrics, SandboxError> {
        let bound = self.settings.run_timeout;
        let mut peak_memory = 0;
        let started = Instant::now();
        let outcome = self
            .exec_bounded(container, command, bound, &mut peak_memory)
            .await?;
        let elapsed = started.elapsed();

        let metrics = match outcome {
            Bounded::TimedOut => ExecutionMetrics {
                status: RunStatus::Timeout,
                output: String::new(),
                diagnostic: format!("Execution timed out after {} ms", bound.as_millis()),
                duration_millis: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
                memory_bytes: peak_memory,
                output_matched_expected: false,
            },
            Bounded::Finished(output) => {
                let status = judge::classify(&self.profile, &output, elapsed, bound);
                let max = self.settings.max_output_bytes;
                let stdout = judge::truncate_output(output.stdout.trim().to_string(), max);
                let matched = expected.is_some_and(|e| judge::outputs_match(&stdout, e));
                ExecutionMetrics {
                    status,
                    diagnostic: judge::truncate_output(output.stderr.trim().to_string(), max),
                    output: stdout,
                    duration_millis: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    memory_bytes: peak_memory,
                    output_matched_expected: matched,
                }
            }
        };

        Ok(metrics)
    }

    /// Runs `command` with a wall-clock bound, sampling memory into `peak`.
    ///
    /// On timeout every process in the container except its init is killed.
    async fn exec_bounded(
        &self,
        container: &ContainerInfo,
        command: Vec<String>,
        bound: Duration,
        peak: &mut u64,
    ) -> Result<Bounded, SandboxError> {
        let sampled = self.exec_sampled(container, command, peak);
        match tokio::time::timeout(bound, sampled).await {
            Ok(result) => result.map(Bounded::Finished),
            Err(_) => {
                warn!(
                    language = %self.language,
                    container_id = %container.short_id(),
                    bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
                    "Run exceeded its time bound, killing it"
                );
                if let Err(e) = self.kill_processes(container).await {
                    warn!(container_id = %container.short_id(), "Kill after timeout failed: {}", e);
                    if e.is_timeout() {
                        self.pool.mark_unhealthy(self.language).await;
                    }
                }
                Ok(Bounded::TimedOut)
            }
        }
    }

    /// Runs `command` while sampling memory into `peak`. A stats call still in
    /// flight when the command finishes is dropped, so sampling never adds to
    /// the run's duration.
    async fn exec_sampled(
        &self,
        container: &ContainerInfo,
        command: Vec<String>,
        peak: &mut u64,
    ) -> Result<ExecOutput, SandboxError> {
        let runtime = self.pool.runtime();
        let id = &container.container_id;
        let exec = runtime.exec(
            id,
            command,
            &self.pool.settings().container_work_dir,
            self.settings.max_output_bytes,
        );
        tokio::pin!(exec);

        let interval = self.settings.memory_sample_interval;
        let sampler = async {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match runtime.memory_usage(id).await {
                    Ok(Some(bytes)) => *peak = (*peak).max(bytes),
                    Ok(None) => {}
                    Err(e) => {
                        debug!(container_id = %container.short_id(), "Memory sampling stopped: {}", e);
                        break;
                    }
                }
            }
        };
        tokio::pin!(sampler);

        tokio::select! {
            result = &mut exec => return result,
            () = &mut sampler => {}
        }
        exec.await
    }

    /// Kills every process in the container except its init.
    async fn kill_processes(&self, container: &ContainerInfo) -> Result<(), SandboxError> {
        let command = vec!["sh".to_string(), "-c".to_string(), "kill -9 -1".to_string()];
        let kill = self.pool.runtime().exec(
            &container.container_id,
            command,
            &self.pool.settings().container_work_dir,
            self.settings.max_output_bytes,
        );
        match tokio::time::timeout(self.settings.kill_timeout, kill).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(SandboxError::timeout(self.settings.kill_timeout)),
        }
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Routes requests to the executor of their language.
#[derive(Debug, Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<Language, LanguageExecutor>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the executor for its language.
    pub fn register(&mut self, executor: LanguageExecutor) {
        self.executors.insert(executor.language(), executor);
    }

    /// Executor for `language`.
    pub fn get(&self, language: Language) -> Result<&LanguageExecutor, ExecuteError> {
        self.executors
            .get(&language)
            .ok_or_else(|| ExecuteError::unsupported(language))
    }

    /// Languages with a registered executor, in stable order.
    pub fn languages(&self) -> Vec<Language> {
        self.executors.keys().copied().collect()
    }

    /// Every registered executor.
    pub fn iter(&self) -> impl Iterator<Item = &LanguageExecutor> {
        self.executors.values()
    }

    /// Dispatches the request to its language's executor.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        self.get(request.language)?.execute(request).await
    }
}
