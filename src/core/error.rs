//! Error taxonomy shared by the registry, the stores and the launcher

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the core
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a registry or launcher operation can report.
///
/// Low-level I/O errors never leave the core untyped: they are wrapped in
/// [`Error::Storage`] or [`Error::Launch`] together with what was being done.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid instance name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Instance '{0}' already exists.")]
    AlreadyExists(String),

    #[error("Instance '{0}' does not exist.")]
    NotFound(String),

    #[error("Source config file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Instance list {} is corrupt: {reason}", .path.display())]
    CorruptList { path: PathBuf, reason: String },

    /// Storage was changed but the instance list could not be saved
    #[error("Instance '{name}' was {action} on disk but the instance list was not updated: {source}")]
    PartialFailure {
        name: String,
        action: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to launch instance '{name}' with {program}: {source}")]
    Launch {
        name: String,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to {action} {}: {source}", .path.display())]
    Storage {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn storage(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            action,
            path: path.into(),
            source,
        }
    }

    /// Stable identifier for the error class, used by the front end
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "invalid_name",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::SourceNotFound(_) => "source_not_found",
            Self::CorruptList { .. } => "corrupt_list",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Launch { .. } => "launch_failed",
            Self::Storage { .. } => "storage",
        }
    }
}
