//! Error taxonomy for the update pipeline
//!
//! Every variant is fatal where it is raised: the loader, calculator and
//! executor never retry or swallow them. The command layer prints the message
//! (including any signer fingerprint) and exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

use crate::trust::TrustError;

/// Result alias used across the core pipeline
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

/// Errors raised while loading catalogs, calculating or executing updates
#[derive(Error, Debug)]
pub enum UpdateError {
    /// A catalog document is malformed or references something it cannot resolve
    #[error("Failed to load catalog {location}: {reason}")]
    Load { location: String, reason: String },

    /// A desired name has no entry in any loaded catalog
    #[error("Unknown tool '{name}': it is not provided by any configured repository")]
    UnknownTool { name: String },

    /// Every candidate version was filtered out by platform requirements or constraints
    #[error("No installable version of '{name}' found: unsupported platform or unsatisfiable constraint")]
    UnsupportedPlatform { name: String },

    /// A version constraint could not be parsed
    #[error("Invalid version constraint '{constraint}' for '{name}'")]
    InvalidConstraint { name: String, constraint: String },

    /// Downloaded content does not match its declared hash
    #[error("Invalid {algorithm} hash for {}\nExpected: {expected}\nActual:   {actual}", .path.display())]
    Integrity {
        path: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// Signature gate rejected an artifact
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// A file or directory could not be read, written or removed
    #[error("Filesystem operation failed on {}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A version to install declares neither glue code nor a download location
    #[error("No bootstrap or download url declared for {name}")]
    MissingSource { name: String },

    /// A name, version or recorded file would resolve outside the installation root
    #[error("Refusing to install {name}: {reason}")]
    UnsafePath { name: String, reason: String },

    /// Fetching a remote or local location failed
    #[error("Download of {location} failed: {reason}")]
    Download { location: String, reason: String },

    /// The installed-state or lock file is corrupt or could not be serialized
    #[error("Invalid installed state {}: {reason}", .path.display())]
    State { path: PathBuf, reason: String },
}

impl UpdateError {
    pub(crate) fn load(location: impl Into<String>, reason: impl Into<String>) -> Self {
        UpdateError::Load {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdateError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn download(location: impl Into<String>, reason: impl ToString) -> Self {
        UpdateError::Download {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}
