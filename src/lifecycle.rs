//! Parallel, bounded-time teardown of pooled containers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::language::Language;
use crate::sandbox::ContainerPool;

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Containers that were pooled, or being created, when cleanup started.
    pub containers: usize,
    /// Per-language tasks that failed or exceeded their bound.
    pub failures: usize,
    /// True if the global bound expired before every task finished.
    pub timed_out: bool,
    /// Wall-clock time the pass took.
    pub elapsed: Duration,
}

impl std::fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cleaned up {} containers in {} ms",
            self.containers,
            self.elapsed.as_millis()
        )?;
        if self.failures > 0 {
            write!(f, " ({} failed)", self.failures)?;
        }
        if self.timed_out {
            write!(f, " (timed out)")?;
        }
        Ok(())
    }
}

/// Tears down every language's container concurrently, one task per language.
#[derive(Debug)]
pub struct CleanupCoordinator {
    pool: Arc<ContainerPool>,
    languages: Vec<Language>,
    per_task_timeout: Duration,
    shut_down: AtomicBool,
}

impl CleanupCoordinator {
    /// Creates a coordinator for the given languages.
    pub fn new(pool: Arc<ContainerPool>, languages: Vec<Language>, per_task_timeout: Duration) -> Self {
        Self {
            pool,
            languages,
            per_task_timeout,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Returns true once [`CleanupCoordinator::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Tears everything down, waiting at most `timeout` overall.
    ///
    /// Never fails: errors and stuck tasks are logged and counted. A stuck
    /// language does not delay the others. Safe to call repeatedly; with
    /// nothing pooled it returns immediately.
    pub async fn cleanup(&self, timeout: Duration) -> CleanupReport {
        let started = Instant::now();
        let containers = self.pool.occupied_count();

        if containers == 0 {
            return CleanupReport {
                elapsed: started.elapsed(),
                ..Default::default()
            };
        }

        info!(containers, "Cleaning up pooled containers");

        let mut tasks = JoinSet::new();
        for &language in &self.languages {
            let pool = Arc::clone(&self.pool);
            let bound = self.per_task_timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(bound, pool.restart(language)).await;
                (language, outcome)
            });
        }

        let mut failures = 0;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(Ok(_)))) => {}
                    Ok((language, Ok(Err(e)))) => {
                        failures += 1;
                        warn!(%language, "Container cleanup failed: {}", e);
                    }
                    Ok((language, Err(_))) => {
                        failures += 1;
                        warn!(%language, "Container cleanup exceeded its time bound");
                    }
                    Err(e) => {
                        failures += 1;
                        warn!("Cleanup task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        let timed_out = drained.is_err();
        if timed_out {
            failures += tasks.len();
            warn!(
                pending = tasks.len(),
                "Cleanup timed out after {} ms, abandoning remaining tasks",
                timeout.as_millis()
            );
            tasks.abort_all();
        }

        let report = CleanupReport {
            containers,
            failures,
            timed_out,
            elapsed: started.elapsed(),
        };
        info!("{}", report);
        report
    }

    /// Final cleanup on process shutdown. Only the first call does any work.
    pub async fn shutdown(&self, timeout: Duration) -> CleanupReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return CleanupReport::default();
        }
        self.cleanup(timeout).await
    }
}
