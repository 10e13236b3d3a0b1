//! Per-run metrics and the aggregate outcome of one execution request.

use serde::{Deserialize, Serialize};

/// Classification of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Exited with status 0.
    Succeeded,
    /// Non-zero exit without a recognised error signature.
    Failed,
    /// Exceeded the wall-clock bound and was killed.
    Timeout,
    /// The source did not compile (or failed to parse).
    CompilationError,
    /// The program crashed with an uncaught error.
    RuntimeError,
}

impl RunStatus {
    /// Returns true for a run that exited cleanly.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::CompilationError => "COMPILATION_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
        };
        f.write_str(name)
    }
}

/// Outcome of a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    /// How the run ended.
    pub status: RunStatus,
    /// Captured stdout, trimmed.
    pub output: String,
    /// Captured stderr, trimmed; empty for clean runs.
    pub diagnostic: String,
    /// Wall-clock duration of the run.
    pub duration_millis: u64,
    /// Peak memory observed while the run was in flight.
    pub memory_bytes: u64,
    /// True only if an expected output was supplied and matched.
    pub output_matched_expected: bool,
}

/// Aggregate outcome across every run of one request.
///
/// Built once by [`ExecutionResult::aggregate`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    success: bool,
    output_matched: bool,
    per_run_metrics: Vec<ExecutionMetrics>,
    avg_duration_millis: u64,
    avg_memory_bytes: u64,
    max_duration_millis: u64,
    max_memory_bytes: u64,
}

impl ExecutionResult {
    /// Aggregates per-run metrics. Returns `None` for an empty sequence.
    pub fn aggregate(runs: Vec<ExecutionMetrics>) -> Option<Self> {
        if runs.is_empty() {
            return None;
        }

        let count = runs.len() as u64;
        let total_duration: u64 = runs.iter().map(|r| r.duration_millis).sum();
        let total_memory: u64 = runs.iter().map(|r| r.memory_bytes).sum();

        Some(Self {
            success: runs.iter().all(|r| r.status.is_success()),
            output_matched: runs.iter().all(|r| r.output_matched_expected),
            avg_duration_millis: total_duration / count,
            avg_memory_bytes: total_memory / count,
            max_duration_millis: runs.iter().map(|r| r.duration_millis).max().unwrap_or(0),
            max_memory_bytes: runs.iter().map(|r| r.memory_bytes).max().unwrap_or(0),
            per_run_metrics: runs,
        })
    }

    /// True iff every run exited cleanly.
    pub fn success(&self) -> bool {
        self.success
    }

    /// True iff an expected output was supplied and every run matched it.
    pub fn output_matched(&self) -> bool {
        self.output_matched
    }

    /// Metrics of each run, in invocation order.
    pub fn per_run_metrics(&self) -> &[ExecutionMetrics] {
        &self.per_run_metrics
    }

    /// Mean run duration.
    pub fn avg_duration_millis(&self) -> u64 {
        self.avg_duration_millis
    }

    /// Mean peak memory.
    pub fn avg_memory_bytes(&self) -> u64 {
        self.avg_memory_bytes
    }

    /// Longest run duration.
    pub fn max_duration_millis(&self) -> u64 {
        self.max_duration_millis
    }

    /// Highest peak memory.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    /// First run that did not succeed, if any.
    pub fn first_failure(&self) -> Option<&ExecutionMetrics> {
        self.per_run_metrics.iter().find(|r| !r.status.is_success())
    }
}
