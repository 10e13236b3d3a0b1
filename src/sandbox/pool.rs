//! One long-lived container per language, created lazily and replaced when
//! it stops answering health checks.
//!
//! Each language owns two locks:
//! - the slot lock, held while a container is looked up, health-checked,
//!   created or torn down, so concurrent callers never create two containers;
//! - the work-directory lock, held by an executor from code injection until
//!   its last run finishes, so same-language requests never overwrite each
//!   other's files.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::workdir::{copy_dir_contents, wipe_dir_contents};
use super::{ContainerRuntime, ContainerSpec, SandboxError, LANGUAGE_LABEL, MANAGED_LABEL};
use crate::language::Language;

/// A pooled, reusable container bound to one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Runtime handle of the container.
    pub container_id: String,
    /// Image the container was created from.
    pub image: String,
    /// Host directory bind-mounted into the container. Owned by this entry.
    pub host_work_dir: PathBuf,
    /// Last time the container was handed out.
    pub last_used_at: DateTime<Utc>,
    /// False once a liveness check failed or a kill did not return.
    pub healthy: bool,
}

impl ContainerInfo {
    /// First 12 characters of the container id, as `docker ps` shows it.
    pub fn short_id(&self) -> &str {
        let end = self.container_id.len().min(12);
        &self.container_id[..end]
    }
}

/// Resource policy applied to every pooled container.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Parent directory for per-container host work directories.
    pub work_root: PathBuf,
    /// Mount point of the work directory inside containers.
    pub container_work_dir: String,
    /// Memory limit in bytes.
    pub memory_bytes: i64,
    /// CPU limit in nano-CPUs.
    pub nano_cpus: i64,
    /// Maximum number of processes per container.
    pub pids_limit: i64,
    /// Size of the `/tmp` scratch tmpfs.
    pub tmpfs_size: String,
    /// Grace period given to `docker stop` before it kills the container.
    pub stop_timeout_secs: i64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("ojsandbox"),
            container_work_dir: "/sandbox".to_string(),
            memory_bytes: 512 * 1024 * 1024,
            nano_cpus: 1_000_000_000,
            pids_limit: 64,
            tmpfs_size: "64m".to_string(),
            stop_timeout_secs: 2,
        }
    }
}

/// Exclusive hold on a language's work directory.
///
/// Dropping the guard lets the next same-language request inject its code.
pub type WorkDirGuard = OwnedMutexGuard<()>;

#[derive(Default)]
struct Slot {
    container: Mutex<Option<ContainerInfo>>,
    workdir: Arc<Mutex<()>>,
}

/// Owns the pooled container of every supported language.
pub struct ContainerPool {
    runtime: Arc<dyn ContainerRuntime>,
    settings: PoolSettings,
    slots: HashMap<Language, Slot>,
}

impl std::fmt::Debug for ContainerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerPool")
            .field("runtime", &self.runtime.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ContainerPool {
    /// Creates an empty pool. No container is created until the first `acquire`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: PoolSettings) -> Self {
        let slots = Language::ALL
            .into_iter()
            .map(|lang| (lang, Slot::default()))
            .collect();
        Self {
            runtime,
            settings,
            slots,
        }
    }

    /// The runtime this pool drives.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// The resource policy applied to new containers.
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn slot(&self, language: Language) -> &Slot {
        // Every language gets a slot in `new`
        &self.slots[&language]
    }

    /// Waits for exclusive use of the language's work directory.
    pub async fn lock_workdir(&self, language: Language) -> WorkDirGuard {
        Arc::clone(&self.slot(language).workdir).lock_owned().await
    }

    /// Returns a running container for `language`, creating or replacing it as needed.
    ///
    /// Two sequential calls without an intervening failure return the same container.
    pub async fn acquire(
        &self,
        language: Language,
        image: &str,
    ) -> Result<ContainerInfo, SandboxError> {
        let mut slot = self.slot(language).container.lock().await;

        if let Some(info) = slot.as_mut() {
            match self.runtime.is_running(&info.container_id).await {
                Ok(true) if info.healthy && info.image == image => {
                    info.healthy = true;
                    info.last_used_at = Utc::now();
                    debug!(%language, container_id = %info.short_id(), "Reusing pooled container");
                    return Ok(info.clone());
                }
                Ok(true) if !info.healthy => {
                    warn!(
                        %language,
                        container_id = %info.short_id(),
                        "Pooled container was marked unhealthy, replacing it"
                    );
                }
                Ok(true) => {
                    info!(
                        %language,
                        old_image = %info.image,
                        new_image = image,
                        "Image changed, replacing pooled container"
                    );
                }
                Ok(false) => {
                    warn!(
                        %language,
                        container_id = %info.short_id(),
                        "Pooled container is not running, replacing it"
                    );
                }
                Err(e) => {
                    warn!(
                        %language,
                        container_id = %info.short_id(),
                        "Health check failed ({}), replacing container",
                        e
                    );
                }
            }
            info.healthy = false;
        }

        if let Some(stale) = slot.take() {
            if let Err(e) = self.teardown(&stale).await {
                warn!(%language, "Failed to tear down stale container: {}", e);
            }
        }

        let info = self.create(language, image).await?;
        *slot = Some(info.clone());
        Ok(info)
    }

    /// Makes sure `image` is available locally, pulling it once if missing.
    pub async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.runtime.image_exists(image).await? {
            return Ok(());
        }

        info!(image, "Image not found locally, pulling");
        self.runtime.pull_image(image).await?;

        if self.runtime.image_exists(image).await? {
            Ok(())
        } else {
            Err(SandboxError::image_not_found(image))
        }
    }

    async fn create(&self, language: Language, image: &str) -> Result<ContainerInfo, SandboxError> {
        self.ensure_image(image).await?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        let host_work_dir = self.settings.work_root.join(format!("{language}-{suffix}"));
        tokio::fs::create_dir_all(&host_work_dir)
            .await
            .map_err(|e| SandboxError::io(&host_work_dir, e))?;

        let spec = self.container_spec(language, image, &host_work_dir, suffix);

        let container_id = match self.runtime.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                remove_work_dir(&host_work_dir).await;
                return Err(e);
            }
        };

        let started = match self.runtime.start_container(&container_id).await {
            Ok(()) => self.runtime.is_running(&container_id).await,
            Err(e) => Err(e),
        };

        match started {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&container_id, &host_work_dir).await;
                return Err(SandboxError::container_unhealthy(format!(
                    "{language} container exited right after start"
                )));
            }
            Err(e) => {
                self.discard(&container_id, &host_work_dir).await;
                return Err(e);
            }
        }

        info!(
            %language,
            image,
            container_id = %&container_id[..container_id.len().min(12)],
            work_dir = %host_work_dir.display(),
            "Created pooled container"
        );

        Ok(ContainerInfo {
            container_id,
            image: image.to_string(),
            host_work_dir,
            last_used_at: Utc::now(),
            healthy: true,
        })
    }

    fn container_spec(
        &self,
        language: Language,
        image: &str,
        host_work_dir: &Path,
        suffix: &str,
    ) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(LANGUAGE_LABEL.to_string(), language.to_string());

        ContainerSpec {
            name: format!("ojsandbox-{language}-{suffix}"),
            image: image.to_string(),
            host_work_dir: host_work_dir.to_path_buf(),
            container_work_dir: self.settings.container_work_dir.clone(),
            memory_bytes: self.settings.memory_bytes,
            nano_cpus: self.settings.nano_cpus,
            pids_limit: self.settings.pids_limit,
            tmpfs_size: self.settings.tmpfs_size.clone(),
            labels,
            keepalive_cmd: vec!["sleep".to_string(), "infinity".to_string()],
        }
    }

    async fn discard(&self, container_id: &str, host_work_dir: &Path) {
        if let Err(e) = self.runtime.remove_container(container_id).await {
            warn!(container_id, "Failed to remove container after failed start: {}", e);
        }
        remove_work_dir(host_work_dir).await;
    }

    /// Flags the language's container so the next `acquire` replaces it.
    pub async fn mark_unhealthy(&self, language: Language) {
        if let Some(info) = self.slot(language).container.lock().await.as_mut() {
            info.healthy = false;
        }
    }

    /// Replaces the contents of the container's work directory with `source_dir`.
    ///
    /// Blocking file I/O: async callers run it on the blocking pool. Callers
    /// must hold the language's [`WorkDirGuard`].
    pub fn inject_code(&self, info: &ContainerInfo, source_dir: &Path) -> Result<usize, SandboxError> {
        wipe_dir_contents(&info.host_work_dir)?;
        let copied = copy_dir_contents(source_dir, &info.host_work_dir)?;
        debug!(
            container_id = %info.short_id(),
            files = copied,
            "Injected code into work directory"
        );
        Ok(copied)
    }

    /// Tears down the language's container; the next `acquire` recreates it.
    ///
    /// The teardown runs on its own task. A caller that stops waiting (for
    /// example on a cleanup timeout) does not leave the container behind.
    ///
    /// Returns true if a container was pooled.
    pub async fn restart(&self, language: Language) -> Result<bool, SandboxError> {
        let Some(info) = self.slot(language).container.lock().await.take() else {
            return Ok(false);
        };
        info!(%language, container_id = %info.short_id(), "Tearing down pooled container");

        let runtime = Arc::clone(&self.runtime);
        let stop_timeout_secs = self.settings.stop_timeout_secs;
        let task =
            tokio::spawn(async move { teardown(runtime.as_ref(), &info, stop_timeout_secs).await });

        match task.await {
            Ok(result) => result.map(|()| true),
            Err(e) => Err(SandboxError::container_failed(format!(
                "Teardown task failed: {e}"
            ))),
        }
    }

    /// Stops, removes and forgets every pooled container.
    ///
    /// Failures are logged and skipped. Returns how many containers were pooled.
    pub async fn shutdown_all(&self) -> usize {
        let mut count = 0;
        for language in Language::ALL {
            match self.restart(language).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    count += 1;
                    warn!(%language, "Failed to shut down container: {}", e);
                }
            }
        }
        count
    }

    async fn teardown(&self, info: &ContainerInfo) -> Result<(), SandboxError> {
        teardown(self.runtime.as_ref(), info, self.settings.stop_timeout_secs).await
    }

    /// Number of languages whose slot holds a container or is busy creating
    /// or replacing one. Never waits on a slot lock.
    pub fn occupied_count(&self) -> usize {
        Language::ALL
            .into_iter()
            .filter(|language| {
                self.slot(*language)
                    .container
                    .try_lock()
                    .map_or(true, |slot| slot.is_some())
            })
            .count()
    }

    /// Number of languages that currently have a pooled container.
    pub async fn pooled_count(&self) -> usize {
        let mut count = 0;
        for language in Language::ALL {
            if self.slot(language).container.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Snapshot of the pooled container of `language`, if any.
    pub async fn current(&self, language: Language) -> Option<ContainerInfo> {
        self.slot(language).container.lock().await.clone()
    }

    /// Human-readable summary per language.
    pub async fn status(&self) -> BTreeMap<Language, String> {
        let mut summary = BTreeMap::new();

        for language in Language::ALL {
            let Ok(slot) = self.slot(language).container.try_lock() else {
                summary.insert(language, "busy (container is being created or replaced)".to_string());
                continue;
            };
            let Some(info) = (*slot).clone() else {
                summary.insert(language, "no container".to_string());
                continue;
            };
            drop(slot);

            let state = match self.runtime.is_running(&info.container_id).await {
                Ok(true) => "running",
                Ok(false) => "stopped",
                Err(_) => "unknown",
            };
            let idle_secs = (Utc::now() - info.last_used_at).num_seconds().max(0);
            summary.insert(
                language,
                format!(
                    "container {} {}, last used {}s ago",
                    info.short_id(),
                    state,
                    idle_secs
                ),
            );
        }

        summary
    }

    /// Removes labelled containers that this pool does not own, e.g. left by a crash.
    pub async fn prune_orphans(&self) -> Result<usize, SandboxError> {
        let mut owned = Vec::new();
        for language in Language::ALL {
            if let Some(info) = self.current(language).await {
                owned.push(info.container_id);
            }
        }

        let mut removed = 0;
        for id in self.runtime.list_managed().await? {
            if owned.contains(&id) {
                continue;
            }
            match self.runtime.remove_container(&id).await {
                Ok(()) => {
                    debug!(container_id = %id, "Removed orphaned container");
                    removed += 1;
                }
                Err(e) => warn!(container_id = %id, "Failed to remove orphaned container: {}", e),
            }
        }

        if removed > 0 {
            info!(removed, "Pruned orphaned sandbox containers");
        }
        Ok(removed)
    }
}

async fn teardown(
    runtime: &dyn ContainerRuntime,
    info: &ContainerInfo,
    stop_timeout_secs: i64,
) -> Result<(), SandboxError> {
    let running = runtime.is_running(&info.container_id).await.unwrap_or(true);

    if running {
        if let Err(e) = runtime
            .stop_container(&info.container_id, stop_timeout_secs)
            .await
        {
            debug!(container_id = %info.short_id(), "Stop failed, forcing removal: {}", e);
        }
    }

    let removed = runtime.remove_container(&info.container_id).await;
    remove_work_dir(&info.host_work_dir).await;
    removed
}

async fn remove_work_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "Failed to remove work directory: {}", e),
    }
}
