//! Domain-specific error types for container runtime and pool operations.
//!
//! Typed errors let the executor tell infrastructure failures (which abort a
//! whole request) apart from per-run outcomes (which never reach this type).

use std::time::Duration;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    DockerUnavailable { message: String },

    /// Container image was not found locally after a pull attempt.
    #[error("Container image not found: {image}")]
    ImageNotFound { image: String },

    /// Pulling an image from its registry failed.
    #[error("Failed to pull image {image}: {message}")]
    ImagePullFailed { image: String, message: String },

    /// A runtime call exceeded its time bound.
    #[error("Container operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Container is in an unrecoverable state (dead, removed, not running).
    #[error("Container is unhealthy: {message}")]
    ContainerUnhealthy { message: String },

    /// Container operation failed (create, start, exec, etc.).
    #[error("Container operation failed: {message}")]
    ContainerFailed { message: String },

    /// Host-side work directory could not be prepared.
    #[error("Work directory error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// Creates a `DockerUnavailable` error.
    pub fn docker_unavailable(message: impl Into<String>) -> Self {
        Self::DockerUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageNotFound` error.
    pub fn image_not_found(image: impl Into<String>) -> Self {
        Self::ImageNotFound {
            image: image.into(),
        }
    }

    /// Creates an `ImagePullFailed` error.
    pub fn image_pull_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImagePullFailed {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a `ContainerUnhealthy` error.
    pub fn container_unhealthy(message: impl Into<String>) -> Self {
        Self::ContainerUnhealthy {
            message: message.into(),
        }
    }

    /// Creates a `ContainerFailed` error.
    pub fn container_failed(message: impl Into<String>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
        }
    }

    /// Creates an `Io` error for the given path.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is a Docker unavailability error.
    pub fn is_docker_unavailable(&self) -> bool {
        matches!(self, Self::DockerUnavailable { .. })
    }

    /// Returns true if the image could not be made available.
    pub fn is_image_error(&self) -> bool {
        matches!(self, Self::ImageNotFound { .. } | Self::ImagePullFailed { .. })
    }
}
