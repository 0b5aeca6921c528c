//! # claw-rollfile
//!
//! Bounded, rotating sets of append-only text files for Clawbernetes.
//!
//! This crate provides:
//!
//! - [`RollingFileWriter`] — appends entries, rotating by size and
//!   dispatching by file count
//! - [`DispatchGuard`] — scoped lock for forcing a dispatch without racing
//!   writers
//! - [`DateStamper`] / [`FileStamper`] — encode and decode creation time and
//!   version in file names
//! - [`DispatchPolicy`] — what happens to files over the count bound, with
//!   [`DeleteOldest`] and [`FormattingDispatcher`] implementations
//! - [`Storage`] — the file-system capability, with [`LocalStorage`] and
//!   [`MemoryStorage`]
//!
//! ## Example
//!
//! ```rust
//! use claw_rollfile::{MemoryStorage, RollingFileConfig, RollingFileWriter, Storage};
//! use std::path::Path;
//!
//! let storage = MemoryStorage::new();
//! storage.create_dir_all(Path::new("/var/spool/events")).unwrap();
//!
//! let config = RollingFileConfig::new("/var/spool/events", "events.log")
//!     .with_max_file_size(64 * 1024)
//!     .with_max_files(5)
//!     .with_versioning(true);
//! let writer = RollingFileWriter::new(storage, config).unwrap();
//!
//! writer.write_data_entry("{\"event\":\"started\"}\n").unwrap();
//!
//! // At shutdown, force a dispatch while no write is in flight.
//! let mut guard = writer.dispatch_lock();
//! guard.dispatch_files_if_needed().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod file_set;
pub mod stamp;
pub mod storage;
pub mod writer;

// Re-export main types
pub use config::{
    RollingFileConfig, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE, DEFAULT_SIZE_CHECK_FREQUENCY,
};
pub use dispatch::{DeleteOldest, DispatchPolicy, FormattingDispatcher, TextFormatter};
pub use error::{Result, RollError};
pub use file_set::{LogFileSet, StampedFile};
pub use stamp::{parse_version, DateStamper, FileStamp, FileStamper, StampVersion, DEFAULT_DATE_FORMAT};
pub use storage::{LocalStorage, MemoryFile, MemoryStorage, OpenMode, Storage};
pub use writer::{DataEntryWriter, DispatchGuard, RollingFileWriter};
