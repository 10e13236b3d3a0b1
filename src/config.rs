use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::ExecutorSettings;
use crate::language::Language;
use crate::sandbox::{parse_cpu_limit, parse_memory_limit, PoolSettings};

/// File name looked up in the working directory and the user config directory.
pub const CONFIG_FILE: &str = "ojsandbox.toml";

/// Top-level configuration, loaded from `ojsandbox.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener and authentication.
    #[serde(default)]
    pub server: ServerConfig,
    /// Container limits and timeouts.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Image per language.
    #[serde(default)]
    pub languages: LanguagesConfig,
    /// Shutdown behaviour.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared secret expected in the `auth` header
    #[serde(default = "default_auth_secret")]
    pub auth_secret: String,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_secret: default_auth_secret(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Container and execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Host directory holding per-container work directories
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Where the work directory is mounted inside containers
    #[serde(default = "default_container_work_dir")]
    pub container_work_dir: String,

    /// Memory limit per container (e.g., "512m")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CPU limit per container (e.g., "1", "0.5")
    #[serde(default = "default_cpus")]
    pub cpus: String,

    /// Process limit per container
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,

    /// Size of the /tmp scratch filesystem
    #[serde(default = "default_tmpfs_size")]
    pub tmpfs_size: String,

    /// Wall-clock bound of one run
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Wall-clock bound of the compile step
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,

    /// Memory sampling period while a run is in flight
    #[serde(default = "default_memory_sample_interval_ms")]
    pub memory_sample_interval_ms: u64,

    /// Captured output beyond this size is dropped
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Upper bound on `executionCount`; larger requests are rejected
    #[serde(default = "default_max_execution_count")]
    pub max_execution_count: u32,

    /// Create every language's container at startup
    #[serde(default)]
    pub prewarm: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            container_work_dir: default_container_work_dir(),
            memory: default_memory(),
            cpus: default_cpus(),
            pids_limit: default_pids_limit(),
            tmpfs_size: default_tmpfs_size(),
            run_timeout_ms: default_run_timeout_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
            memory_sample_interval_ms: default_memory_sample_interval_ms(),
            max_output_bytes: default_max_output_bytes(),
            max_execution_count: default_max_execution_count(),
            prewarm: false,
        }
    }
}

/// Image selection for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Docker image reference
    pub image: String,
}

/// Per-language configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesConfig {
    /// Java image (needs `javac` and `java`)
    #[serde(default = "default_java")]
    pub java: LanguageConfig,

    /// Python image (needs `python3`)
    #[serde(default = "default_python")]
    pub python: LanguageConfig,

    /// JavaScript image (needs `node`)
    #[serde(default = "default_javascript")]
    pub javascript: LanguageConfig,
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            python: default_python(),
            javascript: default_javascript(),
        }
    }
}

impl LanguagesConfig {
    /// Image configured for `language`.
    pub fn image(&self, language: Language) -> &str {
        match language {
            Language::Java => &self.java.image,
            Language::Python => &self.python.image,
            Language::JavaScript => &self.javascript.image,
        }
    }
}

/// Shutdown and startup housekeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Overall bound for tearing down every container
    #[serde(default = "default_cleanup_timeout")]
    pub timeout_secs: u64,

    /// Bound for tearing down a single container
    #[serde(default = "default_per_container_timeout")]
    pub per_container_timeout_secs: u64,

    /// Remove containers left over by a previous process on startup
    #[serde(default = "default_true")]
    pub prune_on_start: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_cleanup_timeout(),
            per_container_timeout_secs: default_per_container_timeout(),
            prune_on_start: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Also write daily-rotated log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_auth_secret() -> String {
    "secretKey".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("ojsandbox")
}

fn default_container_work_dir() -> String {
    "/sandbox".to_string()
}

fn default_memory() -> String {
    "512m".to_string()
}

fn default_cpus() -> String {
    "1".to_string()
}

fn default_pids_limit() -> i64 {
    64
}

fn default_tmpfs_size() -> String {
    "64m".to_string()
}

fn default_run_timeout_ms() -> u64 {
    5000
}

fn default_compile_timeout_ms() -> u64 {
    10_000
}

fn default_memory_sample_interval_ms() -> u64 {
    100
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_max_execution_count() -> u32 {
    10
}

fn default_java() -> LanguageConfig {
    LanguageConfig {
        image: "eclipse-temurin:17-jdk".to_string(),
    }
}

fn default_python() -> LanguageConfig {
    LanguageConfig {
        image: "python:3.11-slim".to_string(),
    }
}

fn default_javascript() -> LanguageConfig {
    LanguageConfig {
        image: "node:20-slim".to_string(),
    }
}

fn default_cleanup_timeout() -> u64 {
    10
}

fn default_per_container_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration, using defaults if no file is found.
    ///
    /// An explicit path must exist. Otherwise `./ojsandbox.toml` is tried,
    /// then `<config dir>/ojsandbox/ojsandbox.toml`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE)),
            dirs::config_dir().map(|dir| dir.join("ojsandbox").join(CONFIG_FILE)),
        ];

        for path in candidates.into_iter().flatten() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check that limits parse and timeouts are non-zero.
    pub fn validate(&self) -> Result<()> {
        parse_memory_limit(&self.sandbox.memory)
            .with_context(|| format!("Invalid memory limit: {}", self.sandbox.memory))?;
        parse_cpu_limit(&self.sandbox.cpus)
            .with_context(|| format!("Invalid CPU limit: {}", self.sandbox.cpus))?;
        anyhow::ensure!(self.sandbox.run_timeout_ms > 0, "run_timeout_ms must be positive");
        anyhow::ensure!(
            self.sandbox.compile_timeout_ms > 0,
            "compile_timeout_ms must be positive"
        );
        anyhow::ensure!(
            self.sandbox.memory_sample_interval_ms > 0,
            "memory_sample_interval_ms must be positive"
        );
        anyhow::ensure!(
            self.sandbox.max_execution_count > 0,
            "max_execution_count must be positive"
        );
        anyhow::ensure!(
            !self.server.auth_secret.is_empty(),
            "auth_secret must not be empty"
        );
        Ok(())
    }

    /// Resource policy for the container pool.
    pub fn pool_settings(&self) -> Result<PoolSettings> {
        let sandbox = &self.sandbox;
        Ok(PoolSettings {
            work_root: sandbox.work_root.join("work"),
            container_work_dir: sandbox.container_work_dir.clone(),
            memory_bytes: parse_memory_limit(&sandbox.memory)
                .with_context(|| format!("Invalid memory limit: {}", sandbox.memory))?,
            nano_cpus: parse_cpu_limit(&sandbox.cpus)
                .with_context(|| format!("Invalid CPU limit: {}", sandbox.cpus))?,
            pids_limit: sandbox.pids_limit,
            tmpfs_size: sandbox.tmpfs_size.clone(),
            stop_timeout_secs: 2,
        })
    }

    /// Tunables shared by the language executors.
    pub fn executor_settings(&self) -> ExecutorSettings {
        let sandbox = &self.sandbox;
        ExecutorSettings {
            run_timeout: Duration::from_millis(sandbox.run_timeout_ms),
            compile_timeout: Duration::from_millis(sandbox.compile_timeout_ms),
            memory_sample_interval: Duration::from_millis(sandbox.memory_sample_interval_ms),
            max_output_bytes: sandbox.max_output_bytes,
            max_execution_count: sandbox.max_execution_count,
            kill_timeout: Duration::from_secs(3),
            payload_root: sandbox.work_root.join("payloads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8090");
        assert_eq!(config.sandbox.memory, "512m");
        assert_eq!(config.sandbox.run_timeout_ms, 5000);
        assert!(!config.sandbox.prewarm);
        assert!(config.cleanup.prune_on_start);
        assert_eq!(config.languages.image(Language::Python), "python:3.11-slim");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
bind = "127.0.0.1:9000"
auth_secret = "s3cret"

[sandbox]
memory = "256m"
cpus = "0.5"
run_timeout_ms = 2000
prewarm = true

[languages.python]
image = "python:3.12-alpine"

[cleanup]
timeout_secs = 3

[logging]
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.auth_secret, "s3cret");
        assert!(config.sandbox.prewarm);
        assert_eq!(config.languages.image(Language::Python), "python:3.12-alpine");
        assert_eq!(config.languages.image(Language::Java), "eclipse-temurin:17-jdk");
        assert_eq!(config.cleanup.timeout_secs, 3);
        assert_eq!(config.cleanup.per_container_timeout_secs, 5);
        assert_eq!(config.logging.format, LogFormat::Json);

        let pool = config.pool_settings().unwrap();
        assert_eq!(pool.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(pool.nano_cpus, 500_000_000);

        let exec = config.executor_settings();
        assert_eq!(exec.run_timeout, Duration::from_secs(2));
        assert_eq!(exec.max_execution_count, 10);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = Config::default();
        config.sandbox.memory = "lots".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sandbox.run_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sandbox.max_execution_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[sandbox]\ncpus = \"2\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sandbox.cpus, "2");

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
