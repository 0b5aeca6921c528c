//! Configuration for rolling file writers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RollError};

/// Default maximum size of a single file in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;

/// Default maximum number of files kept in the directory.
pub const DEFAULT_MAX_FILES: usize = 10;

/// Default number of writes between two file size checks.
pub const DEFAULT_SIZE_CHECK_FREQUENCY: u32 = 100;

/// Configuration for a [`RollingFileWriter`](crate::RollingFileWriter).
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingFileConfig {
    /// Directory holding the files. Must already exist.
    pub directory: PathBuf,
    /// File name with extension, e.g. `events.log`.
    pub file_name: String,
    /// Maximum size of a single file before rotation (bytes).
    pub max_file_size: u64,
    /// Number of files at which the dispatch policy runs.
    pub max_files: usize,
    /// Writes between two size checks. `1` checks on every write.
    pub size_check_frequency: u32,
    /// Whether file names carry a `_(n)` version suffix.
    pub versioning: bool,
}

impl Default for RollingFileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "claw.log".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            size_check_frequency: DEFAULT_SIZE_CHECK_FREQUENCY,
            versioning: false,
        }
    }
}

impl RollingFileConfig {
    /// Creates a config for `file_name` inside `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Parses a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] if the JSON is malformed or the
    /// resulting config is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RollError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the max file size for rotation.
    #[must_use]
    pub const fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the max number of files.
    #[must_use]
    pub const fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    /// Sets how many writes pass between size checks.
    #[must_use]
    pub const fn with_size_check_frequency(mut self, writes: u32) -> Self {
        self.size_check_frequency = writes;
        self
    }

    /// Enables or disables the version suffix.
    #[must_use]
    pub const fn with_versioning(mut self, enabled: bool) -> Self {
        self.versioning = enabled;
        self
    }

    /// Returns the file name without its extension.
    #[must_use]
    pub fn base_name(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
    }

    /// Returns the file extension without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|s| s.to_str())
            .filter(|ext| !ext.is_empty())
    }

    /// Checks the settings that do not depend on storage.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if Path::new(&self.file_name).components().count() != 1 {
            return Err(RollError::Configuration(format!(
                "file name {:?} must not contain a directory",
                self.file_name
            )));
        }
        if self.extension().is_none() {
            return Err(RollError::Configuration(format!(
                "file name {:?} has no extension",
                self.file_name
            )));
        }
        if self.base_name().is_none_or(str::is_empty) {
            return Err(RollError::Configuration(format!(
                "file name {:?} has no base name",
                self.file_name
            )));
        }
        if self.max_file_size == 0 {
            return Err(RollError::Configuration(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        if self.max_files == 0 {
            return Err(RollError::Configuration(
                "max_files must be greater than zero".to_string(),
            ));
        }
        if self.size_check_frequency == 0 {
            return Err(RollError::Configuration(
                "size_check_frequency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
