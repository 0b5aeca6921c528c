//! Rolling file writer.
//!
//! [`RollingFileWriter`] appends text entries to one current file, rotating
//! to a new stamped file once the size bound is exceeded and handing older
//! files to a [`DispatchPolicy`] once the count bound is reached.
//!
//! All mutable state lives in a single [`WriteSession`] behind one mutex, so
//! size check, dispatch, file creation and append form one atomic step per
//! call. [`RollingFileWriter::dispatch_lock`] exposes the same mutex as an
//! RAII guard for callers that need to force a dispatch, e.g. at shutdown.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::RollingFileConfig;
use crate::dispatch::{DeleteOldest, DispatchPolicy};
use crate::error::{Result, RollError};
use crate::file_set::{LogFileSet, StampedFile};
use crate::stamp::{DateStamper, FileStamper};
use crate::storage::{OpenMode, Storage};

/// Pause between stamp attempts while the clock has not moved past an
/// existing file name.
const STAMP_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Longest wait for a fresh file name. Covers one tick of a second-precision
/// date format.
const STAMP_COLLISION_TIMEOUT: Duration = Duration::from_millis(1_100);

/// General write contract for entry sinks.
pub trait DataEntryWriter: Send + Sync {
    /// Appends `data` to the current output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is too large or storage fails.
    fn write_data_entry(&self, data: &str) -> Result<()>;

    /// Returns the current output file, creating the first one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn output_file_name(&self) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionState {
    Disabled,
    Undiscovered,
    Assigned(u32),
}

/// Mutable state of one writer. Only touched while the writer's lock is held.
#[derive(Debug)]
struct WriteSession {
    current: Option<PathBuf>,
    length: u64,
    writes_since_check: u32,
    version: VersionState,
}

/// Writer over a rotating, bounded set of append-only text files.
pub struct RollingFileWriter<S: Storage> {
    storage: S,
    config: RollingFileConfig,
    file_set: LogFileSet,
    stamper: Box<dyn FileStamper>,
    policy: Box<dyn DispatchPolicy>,
    session: Mutex<WriteSession>,
}

impl<S: Storage> fmt::Debug for RollingFileWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingFileWriter")
            .field("file_set", &self.file_set)
            .field("stamper", &self.stamper)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> RollingFileWriter<S> {
    /// Creates a writer.
    ///
    /// No file is created until the first write or call to
    /// [`output_file_name`](Self::output_file_name).
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] if the config is invalid or the
    /// directory does not exist.
    pub fn new(storage: S, config: RollingFileConfig) -> Result<Self> {
        let file_set = LogFileSet::from_config(&config)?;
        if !storage.directory_exists(file_set.directory()) {
            return Err(RollError::Configuration(format!(
                "directory {} does not exist",
                file_set.directory().display()
            )));
        }

        let version = if config.versioning {
            VersionState::Undiscovered
        } else {
            VersionState::Disabled
        };

        Ok(Self {
            policy: Box::new(DeleteOldest::new(storage.clone())),
            storage,
            config,
            file_set,
            stamper: Box::new(DateStamper::default()),
            session: Mutex::new(WriteSession {
                current: None,
                length: 0,
                writes_since_check: 0,
                version,
            }),
        })
    }

    /// Replaces the default [`DateStamper`].
    #[must_use]
    pub fn with_stamper(mut self, stamper: impl FileStamper + 'static) -> Self {
        self.stamper = Box::new(stamper);
        self
    }

    /// Replaces the default [`DeleteOldest`] policy.
    #[must_use]
    pub fn with_dispatch_policy(mut self, policy: impl DispatchPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RollingFileConfig {
        &self.config
    }

    /// Returns the managed file set.
    #[must_use]
    pub const fn file_set(&self) -> &LogFileSet {
        &self.file_set
    }

    /// Appends `data` to the current file, rotating first if needed.
    ///
    /// # Errors
    ///
    /// - [`RollError::Overflow`] if `data` alone exceeds the max file size
    /// - [`RollError::Write`] if storage fails
    /// - any error returned by the dispatch policy
    pub fn write_data_entry(&self, data: &str) -> Result<()> {
        let size = data.len() as u64;
        let mut session = self.session.lock();
        let mut path = self.ensure_file(&mut session)?;

        if size > self.config.max_file_size {
            return Err(RollError::Overflow {
                path,
                size,
                max: self.config.max_file_size,
            });
        }

        session.writes_since_check += 1;
        if session.writes_since_check >= self.config.size_check_frequency {
            session.writes_since_check = 0;
            session.length = self.measure(&path)?;
            let projected = session.length + size;
            if projected > self.config.max_file_size {
                debug!(
                    path = %path.display(),
                    projected,
                    max = self.config.max_file_size,
                    "size bound exceeded, rotating"
                );
                self.dispatch_locked(&session)?;
                path = self.open_new_file(&mut session)?;
            }
        }

        self.append(&path, data)?;
        session.length += size;
        Ok(())
    }

    /// Returns the current file, creating the first one if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Write`] if the file cannot be created.
    pub fn output_file_name(&self) -> Result<PathBuf> {
        let mut session = self.session.lock();
        self.ensure_file(&mut session)
    }

    /// Locks the writer for an external dispatch.
    ///
    /// While the guard lives every write on this writer blocks. The guard is
    /// the only way to reach
    /// [`dispatch_files_if_needed`](DispatchGuard::dispatch_files_if_needed).
    pub fn dispatch_lock(&self) -> DispatchGuard<'_, S> {
        DispatchGuard {
            writer: self,
            session: self.session.lock(),
        }
    }

    /// Lists the files of this writer's set, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Write`] if the directory cannot be listed.
    pub fn files(&self) -> Result<Vec<StampedFile>> {
        self.scan()
    }

    /// Tracked length of the current file in bytes.
    #[must_use]
    pub fn current_length(&self) -> u64 {
        self.session.lock().length
    }

    /// Version assigned to this writer, if versioning is enabled and a file
    /// has been created.
    #[must_use]
    pub fn current_version(&self) -> Option<u32> {
        match self.session.lock().version {
            VersionState::Assigned(v) => Some(v),
            VersionState::Disabled | VersionState::Undiscovered => None,
        }
    }

    // ========== Internal Methods ==========

    fn ensure_file(&self, session: &mut WriteSession) -> Result<PathBuf> {
        match &session.current {
            Some(path) => Ok(path.clone()),
            None => self.open_new_file(session),
        }
    }

    fn open_new_file(&self, session: &mut WriteSession) -> Result<PathBuf> {
        let version = self.resolve_version(session)?;
        let path = self.fresh_path(session, version)?;

        self.storage
            .open(&path, OpenMode::CreateOrOpen)
            .map_err(|e| RollError::write(&path, e))?;
        let length = self
            .storage
            .file_len(&path)
            .map_err(|e| RollError::write(&path, e))?;

        debug!(path = %path.display(), ?version, "opened new file");
        session.current = Some(path.clone());
        session.length = length;
        session.writes_since_check = 0;
        Ok(path)
    }

    // Stamps until the name differs from the current file and from every
    // existing file, so a rotation never reopens a full file.
    fn fresh_path(&self, session: &WriteSession, version: Option<u32>) -> Result<PathBuf> {
        let deadline = Instant::now() + STAMP_COLLISION_TIMEOUT;
        loop {
            let stamped = self.stamper.stamp(&self.file_set.base_path(), version);
            let path = self.file_set.file_path(stamped);
            let taken =
                session.current.as_deref() == Some(path.as_path()) || self.storage.exists(&path);
            if !taken {
                return Ok(path);
            }
            if Instant::now() >= deadline {
                warn!(path = %path.display(), "no fresh file name available");
                return Err(RollError::write(
                    &path,
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "stamped file name already in use",
                    ),
                ));
            }
            thread::sleep(STAMP_RETRY_INTERVAL);
        }
    }

    fn resolve_version(&self, session: &mut WriteSession) -> Result<Option<u32>> {
        match session.version {
            VersionState::Disabled => Ok(None),
            VersionState::Assigned(v) => Ok(Some(v)),
            VersionState::Undiscovered => {
                let files = self.scan()?;
                let version = LogFileSet::max_version(&files).map_or(0, |max| max.saturating_add(1));
                debug!(
                    directory = %self.file_set.directory().display(),
                    existing = files.len(),
                    version,
                    "discovered file version"
                );
                session.version = VersionState::Assigned(version);
                Ok(Some(version))
            }
        }
    }

    fn dispatch_locked(&self, session: &WriteSession) -> Result<bool> {
        let files = self.scan()?;
        if files.len() < self.config.max_files {
            return Ok(false);
        }

        info!(
            directory = %self.file_set.directory().display(),
            count = files.len(),
            max = self.config.max_files,
            current = ?session.current,
            "file count bound reached, dispatching"
        );
        let paths: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
        self.policy.dispatch(&paths)?;
        Ok(true)
    }

    fn scan(&self) -> Result<Vec<StampedFile>> {
        self.file_set
            .scan(&self.storage, self.stamper.as_ref())
            .map_err(|e| RollError::write(self.file_set.directory(), e))
    }

    // A dispatched-away current file counts as empty; the next append recreates it.
    fn measure(&self, path: &Path) -> Result<u64> {
        if !self.storage.exists(path) {
            return Ok(0);
        }
        self.storage
            .file_len(path)
            .map_err(|e| RollError::write(path, e))
    }

    fn append(&self, path: &Path, data: &str) -> Result<()> {
        let mut file = self
            .storage
            .open(path, OpenMode::Append)
            .map_err(|e| RollError::write(path, e))?;
        file.write_all(data.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RollError::write(path, e))
    }
}

impl<S: Storage> DataEntryWriter for RollingFileWriter<S> {
    fn write_data_entry(&self, data: &str) -> Result<()> {
        RollingFileWriter::write_data_entry(self, data)
    }

    fn output_file_name(&self) -> Result<PathBuf> {
        RollingFileWriter::output_file_name(self)
    }
}

/// Scoped lock over a [`RollingFileWriter`].
///
/// Released on drop.
pub struct DispatchGuard<'a, S: Storage> {
    writer: &'a RollingFileWriter<S>,
    session: MutexGuard<'a, WriteSession>,
}

impl<S: Storage> DispatchGuard<'_, S> {
    /// Runs the dispatch policy if the file count is at or above the bound.
    ///
    /// Returns `true` if the policy ran.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Write`] if the directory cannot be listed, or the
    /// policy's error.
    pub fn dispatch_files_if_needed(&mut self) -> Result<bool> {
        self.writer.dispatch_locked(&self.session)
    }

    /// Path of the current file, if one has been created.
    #[must_use]
    pub fn current_file(&self) -> Option<&Path> {
        self.session.current.as_deref()
    }
}

impl<S: Storage> fmt::Debug for DispatchGuard<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchGuard")
            .field("current", &self.session.current)
            .finish_non_exhaustive()
    }
}
