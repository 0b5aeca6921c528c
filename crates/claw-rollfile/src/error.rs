//! Error types for rolling file management.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing, rotating or dispatching files.
#[derive(Debug, Error)]
pub enum RollError {
    /// The writer or dispatcher was constructed with invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single entry is larger than the maximum file size.
    #[error("entry of {size} bytes exceeds maximum file size of {max} bytes for {}", .path.display())]
    Overflow {
        /// File the entry was destined for.
        path: PathBuf,
        /// Size of the rejected entry in bytes.
        size: u64,
        /// Configured maximum file size in bytes.
        max: u64,
    },

    /// Storage failed while measuring, rotating or appending.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying storage error.
        #[source]
        source: std::io::Error,
    },

    /// Storage failed while a dispatch policy handled a file.
    #[error("failed to dispatch {}: {source}", .path.display())]
    Dispatch {
        /// File being dispatched.
        path: PathBuf,
        /// Underlying storage error.
        #[source]
        source: std::io::Error,
    },
}

impl RollError {
    /// Wraps a storage error raised while writing `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Wraps a storage error raised while dispatching `path`.
    pub fn dispatch(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Dispatch {
            path: path.into(),
            source,
        }
    }

    /// Returns the file path the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Configuration(_) => None,
            Self::Overflow { path, .. } | Self::Write { path, .. } | Self::Dispatch { path, .. } => {
                Some(path.as_path())
            }
        }
    }
}

/// Result type alias for rolling file operations.
pub type Result<T> = std::result::Result<T, RollError>;
