//! Dispatch policies: what happens to files once the count bound is reached.
//!
//! This module provides:
//! - [`DispatchPolicy`] — strategy invoked with the file set, oldest first
//! - [`DeleteOldest`] — the default policy, deleting the single oldest file
//! - [`FormattingDispatcher`] — moves files into another directory,
//!   optionally rewriting their content through a [`TextFormatter`]
//!
//! Policies run while the writer's lock is held. They must be quick and must
//! not call back into the writer that invoked them.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, RollError};
use crate::storage::{OpenMode, Storage};

/// Strategy for disposing of files when the file-count bound is reached.
pub trait DispatchPolicy: Send + Sync {
    /// Handles `files`, ordered oldest first.
    ///
    /// The list may be empty. Entries the policy chooses to ignore must not
    /// produce an error.
    ///
    /// # Errors
    ///
    /// Errors propagate unchanged to the caller of the write that triggered
    /// the dispatch.
    fn dispatch(&self, files: &[PathBuf]) -> Result<()>;
}

impl<F> DispatchPolicy for F
where
    F: Fn(&[PathBuf]) -> Result<()> + Send + Sync,
{
    fn dispatch(&self, files: &[PathBuf]) -> Result<()> {
        self(files)
    }
}

/// Deletes the single oldest file.
#[derive(Debug, Clone)]
pub struct DeleteOldest<S> {
    storage: S,
}

impl<S: Storage> DeleteOldest<S> {
    /// Creates the policy over `storage`.
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }
}

impl<S: Storage> DispatchPolicy for DeleteOldest<S> {
    fn dispatch(&self, files: &[PathBuf]) -> Result<()> {
        let Some(oldest) = files.iter().find(|p| p.file_name().is_some()) else {
            return Ok(());
        };
        debug!(path = %oldest.display(), "deleting oldest file");
        self.storage
            .delete(oldest)
            .map_err(|e| RollError::dispatch(oldest, e))
    }
}

/// Rewrites file content during dispatch.
pub trait TextFormatter: Send + Sync {
    /// Returns the text written to the destination.
    fn format(&self, content: &str) -> String;
}

impl<F> TextFormatter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn format(&self, content: &str) -> String {
        self(content)
    }
}

/// Moves dispatched files into a target directory.
///
/// Only the file name is kept. A file already present at the destination is
/// replaced, so a file that is still being written can be dispatched again
/// later with more content.
pub struct FormattingDispatcher<S> {
    storage: S,
    target_dir: PathBuf,
    formatter: Option<Box<dyn TextFormatter>>,
}

impl<S> fmt::Debug for FormattingDispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormattingDispatcher")
            .field("target_dir", &self.target_dir)
            .field("formatter", &self.formatter.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Storage> FormattingDispatcher<S> {
    /// Creates a dispatcher moving files into `target_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] if the target directory does not
    /// exist.
    pub fn new(storage: S, target_dir: impl Into<PathBuf>) -> Result<Self> {
        let target_dir = target_dir.into();
        if !storage.directory_exists(&target_dir) {
            return Err(RollError::Configuration(format!(
                "dispatch directory {} does not exist",
                target_dir.display()
            )));
        }
        Ok(Self {
            storage,
            target_dir,
            formatter: None,
        })
    }

    /// Rewrites content through `formatter` instead of moving raw files.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl TextFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Returns the target directory.
    #[must_use]
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Moves each of `files` into the target directory.
    ///
    /// Entries without a file name and sources that no longer exist are
    /// skipped. Returns the number of files moved.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Dispatch`] naming the file whose storage
    /// operation failed. Files before it have already been moved.
    pub fn dispatch_files(&self, files: &[PathBuf]) -> Result<usize> {
        let mut moved = 0;
        for source in files {
            let Some(name) = source.file_name() else {
                warn!(path = %source.display(), "skipping dispatch entry without a file name");
                continue;
            };
            if !self.storage.exists(source) {
                debug!(path = %source.display(), "dispatch source already gone");
                continue;
            }
            let destination = self.target_dir.join(name);
            self.dispatch_one(source, &destination)
                .map_err(|e| RollError::dispatch(source, e))?;
            info!(
                from = %source.display(),
                to = %destination.display(),
                formatted = self.formatter.is_some(),
                "dispatched file"
            );
            moved += 1;
        }
        Ok(moved)
    }

    fn dispatch_one(&self, source: &Path, destination: &Path) -> std::io::Result<()> {
        let Some(formatter) = &self.formatter else {
            self.clear_destination(destination)?;
            return self.storage.move_file(source, destination);
        };

        let content = self.storage.read_to_string(source)?;
        self.storage.delete(source)?;
        let formatted = formatter.format(&content);

        self.clear_destination(destination)?;
        let mut file = self.storage.open(destination, OpenMode::Replace)?;
        file.write_all(formatted.as_bytes())?;
        file.flush()
    }

    fn clear_destination(&self, destination: &Path) -> std::io::Result<()> {
        if self.storage.exists(destination) {
            self.storage.delete(destination)?;
        }
        Ok(())
    }
}

impl<S: Storage> DispatchPolicy for FormattingDispatcher<S> {
    fn dispatch(&self, files: &[PathBuf]) -> Result<()> {
        self.dispatch_files(files).map(|_| ())
    }
}
