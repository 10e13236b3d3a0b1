//! Request-level failures. Per-run failures never surface here; they are
//! recorded in the run's status instead.

use crate::language::Language;
use crate::sandbox::SandboxError;

/// Errors that abort a whole execution request.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The request itself is malformed (e.g. blank code).
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// No executor is registered for the language.
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage { language: String },

    /// The pooled container could not be obtained or stopped responding.
    #[error("Container unavailable: {0}")]
    ContainerUnavailable(#[from] SandboxError),

    /// The code payload could not be written to disk.
    #[error("Failed to prepare code payload: {0}")]
    Payload(#[source] std::io::Error),
}

impl ExecuteError {
    /// Creates a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an `UnsupportedLanguage` error.
    pub fn unsupported(language: Language) -> Self {
        Self::UnsupportedLanguage {
            language: language.to_string(),
        }
    }
}
