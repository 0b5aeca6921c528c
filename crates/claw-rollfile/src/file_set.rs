//! Identity and discovery of the files one writer manages.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::RollingFileConfig;
use crate::error::{Result, RollError};
use crate::stamp::{FileStamper, StampVersion};
use crate::storage::Storage;

/// A file belonging to a [`LogFileSet`], with its parsed stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedFile {
    /// Full path including extension.
    pub path: PathBuf,
    /// Creation instant parsed from the name.
    pub created: DateTime<Utc>,
    /// Version parsed from the name.
    pub version: StampVersion,
}

/// The files sharing one directory, base name and extension.
///
/// File names are the only record of creation time and version; there is no
/// index file, so discovery costs one directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileSet {
    directory: PathBuf,
    base_name: String,
    extension: String,
}

impl LogFileSet {
    /// Creates a file set.
    #[must_use]
    pub fn new(
        directory: impl Into<PathBuf>,
        base_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            base_name: base_name.into(),
            extension: extension.into(),
        }
    }

    /// Derives the file set from a writer config.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] if the config is invalid.
    pub fn from_config(config: &RollingFileConfig) -> Result<Self> {
        config.validate()?;
        match (config.base_name(), config.extension()) {
            (Some(base), Some(ext)) => Ok(Self::new(&config.directory, base, ext)),
            _ => Err(RollError::Configuration(format!(
                "file name {:?} has no extension",
                config.file_name
            ))),
        }
    }

    /// Returns the directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the base name.
    #[must_use]
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Returns the extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path handed to the stamper: directory joined with the base name.
    #[must_use]
    pub fn base_path(&self) -> PathBuf {
        self.directory.join(&self.base_name)
    }

    /// Appends the extension to a stamped path.
    #[must_use]
    pub fn file_path(&self, stamped: PathBuf) -> PathBuf {
        let mut path = stamped.into_os_string();
        path.push(".");
        path.push(&self.extension);
        PathBuf::from(path)
    }

    /// Returns the stamped file if `path` belongs to this set.
    #[must_use]
    pub fn member(&self, path: &Path, stamper: &dyn FileStamper) -> Option<StampedFile> {
        if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
            return None;
        }
        let stem = path.file_stem().and_then(|s| s.to_str())?;
        if !stem.starts_with(&self.base_name) {
            return None;
        }

        let stamp = stamper.parse(&self.base_name, Path::new(stem));
        let Some(created) = stamp.created else {
            warn!(path = %path.display(), "skipping file with unreadable date stamp");
            return None;
        };
        Some(StampedFile {
            path: path.to_path_buf(),
            created,
            version: stamp.version,
        })
    }

    /// Lists the members of this set, oldest first.
    ///
    /// Ties on creation time are broken by version, then path.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the directory cannot be listed.
    pub fn scan<S: Storage>(
        &self,
        storage: &S,
        stamper: &dyn FileStamper,
    ) -> io::Result<Vec<StampedFile>> {
        let mut files: Vec<StampedFile> = storage
            .list_files(&self.directory)?
            .iter()
            .filter_map(|path| self.member(path, stamper))
            .collect();
        files.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.version.number().cmp(&b.version.number()))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(files)
    }

    /// Highest well-formed version among `files`.
    #[must_use]
    pub fn max_version(files: &[StampedFile]) -> Option<u32> {
        files.iter().filter_map(|f| f.version.number()).max()
    }
}
