//! Unified error handling for the I3D exporter
//!
//! Fatal conditions abort the export without leaving partial output on disk.
//! Merge-group conflicts are recoverable: they are carried in the export
//! report as [`ConflictError`] values and only the affected group is skipped.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Merge-group topology mismatch.
///
/// Recoverable: the group is skipped, every other node still exports.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Merge group '{group}' rejected ({reason}): {}", offending.join(", "))]
pub struct ConflictError {
    /// Merge-group tag
    pub group: String,
    /// Names of the members whose material-slot topology differs from the group root
    pub offending: Vec<String>,
    /// Human readable description of the mismatch
    pub reason: String,
}

/// Unified error type for all exporter operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Disk read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Scene Errors ====================

    /// Malformed input tree (cycle, dangling reference, ...)
    #[error("Structural error: {message}")]
    Structural {
        message: String,
    },

    /// Merge-group topology mismatch
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Internal contract violation, e.g. skin resolution before id assignment
    #[error("Ordering error: {message}")]
    Ordering {
        message: String,
    },

    /// Scene description could not be decoded
    #[error("Scene format error: {message}")]
    SceneFormat {
        message: String,
    },

    /// Shader template could not be read
    #[error("Shader template error in {path}: {message}")]
    ShaderTemplate {
        path: PathBuf,
        message: String,
    },

    // ==================== Configuration Errors ====================

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    // ==================== General Errors ====================

    /// Operation cancelled by the host
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error (should not happen)
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Error::Structural {
            message: message.into(),
        }
    }

    /// Create an ordering (contract violation) error
    pub fn ordering(message: impl Into<String>) -> Self {
        Error::Ordering {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a scene format error
    pub fn scene_format(message: impl Into<String>) -> Self {
        Error::SceneFormat {
            message: message.into(),
        }
    }

    /// The innermost error, with all context layers stripped
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this error can be handled per item without aborting the export
    pub fn is_recoverable(&self) -> bool {
        matches!(self.root_cause(), Error::Conflict(_))
    }

    /// Check if this error aborts the whole export
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
