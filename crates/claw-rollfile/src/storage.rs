//! Storage capability consumed by the rolling writer and dispatchers.
//!
//! This module provides:
//! - [`Storage`] — the narrow file-system interface the core depends on
//! - [`OpenMode`] — how a file handle is opened
//! - [`LocalStorage`] — implementation over `std::fs`
//! - [`MemoryStorage`] — shared in-memory implementation for tests and embedding

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// How a file is opened through [`Storage::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Read an existing file.
    ReadOnly,
    /// Append to the end of a file, creating it if missing.
    Append,
    /// Create the file, or truncate it if it already exists.
    Replace,
    /// Open an existing file without truncating, or create an empty one.
    CreateOrOpen,
}

impl OpenMode {
    /// Returns true if handles opened in this mode accept writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// File-system capability.
///
/// Implementors are cheap handles: cloning must yield a handle onto the same
/// underlying storage so a writer and its dispatch policy observe one view.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Handle returned by [`Storage::open`].
    type File: Read + Write + Send;

    /// Returns true if a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Deletes the file at `path`.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Moves `from` to `to`, replacing any file already at `to`.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Opens `path` in the given mode.
    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Self::File>;

    /// Lists the files (not directories) directly inside `dir`, sorted by path.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns true if `dir` exists and is a directory.
    fn directory_exists(&self, dir: &Path) -> bool;

    /// Returns the length of the file at `path` in bytes.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Creates `dir` and any missing parents.
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Reads the whole file at `path` as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let mut file = self.open(path, OpenMode::ReadOnly)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }
}

// ============================================================================
// Local file system
// ============================================================================

/// [`Storage`] backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LocalStorage {
    /// Creates a new local storage handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

// Rename cannot cross filesystems; copy replaces `to` and the source goes last.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    fs::remove_file(from)
}

impl Storage for LocalStorage {
    type File = File;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(from, to),
            other => other,
        }
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<File> {
        match mode {
            OpenMode::ReadOnly => File::open(path),
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(path),
            OpenMode::Replace => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path),
            OpenMode::CreateOrOpen => OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path),
        }
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn directory_exists(&self, dir: &Path) -> bool {
        dir.is_dir()
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
}

impl MemoryState {
    fn require_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {}", path.display()),
    )
}

/// In-memory [`Storage`].
///
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file directly, creating its parent directories.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state.write();
        if let Some(parent) = path.parent() {
            for dir in parent.ancestors().filter(|d| !d.as_os_str().is_empty()) {
                state.dirs.insert(dir.to_path_buf());
            }
        }
        state.files.insert(path, data.into());
    }

    /// Returns the content of a file, if present.
    #[must_use]
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.read().files.get(path).cloned()
    }

    /// Returns the number of files across all directories.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }
}

impl Storage for MemoryStorage {
    type File = MemoryFile;

    fn exists(&self, path: &Path) -> bool {
        self.state.read().files.contains_key(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.state
            .write()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        state.require_parent(to)?;
        let data = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<MemoryFile> {
        let mut state = self.state.write();
        match mode {
            OpenMode::ReadOnly => {
                if !state.files.contains_key(path) {
                    return Err(not_found(path));
                }
            }
            OpenMode::Append | OpenMode::CreateOrOpen => {
                state.require_parent(path)?;
                state.files.entry(path.to_path_buf()).or_default();
            }
            OpenMode::Replace => {
                state.require_parent(path)?;
                state.files.insert(path.to_path_buf(), Vec::new());
            }
        }
        Ok(MemoryFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            position: 0,
            writable: mode.is_writable(),
        })
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.read();
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        let mut files: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        files.sort();
        Ok(files)
    }

    fn directory_exists(&self, dir: &Path) -> bool {
        self.state.read().dirs.contains(dir)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        self.state
            .read()
            .files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        for ancestor in dir.ancestors().filter(|d| !d.as_os_str().is_empty()) {
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }
}

/// Handle to a file inside a [`MemoryStorage`].
///
/// Writes always go to the end of the file and are visible immediately to
/// every other handle.
#[derive(Debug)]
pub struct MemoryFile {
    state: Arc<RwLock<MemoryState>>,
    path: PathBuf,
    position: usize,
    writable: bool,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.read();
        let Some(data) = state.files.get(&self.path) else {
            return Ok(0);
        };
        let remaining = data.get(self.position..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("opened read-only: {}", self.path.display()),
            ));
        }
        let mut state = self.state.write();
        state
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_with_dir(dir: &str) -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new(dir)).expect("create dir");
        storage
    }

    #[test]
    fn open_mode_writable() {
        assert!(!OpenMode::ReadOnly.is_writable());
        assert!(OpenMode::Append.is_writable());
        assert!(OpenMode::Replace.is_writable());
        assert!(OpenMode::CreateOrOpen.is_writable());
    }

    // --- MemoryStorage ---

    #[test]
    fn memory_append_creates_and_extends() {
        let storage = memory_with_dir("/logs");
        let path = Path::new("/logs/a.txt");

        storage
            .open(path, OpenMode::Append)
            .and_then(|mut f| f.write_all(b"hello "))
            .expect("first append");
        storage
            .open(path, OpenMode::Append)
            .and_then(|mut f| f.write_all(b"world"))
            .expect("second append");

        assert_eq!(storage.read_to_string(path).expect("read"), "hello world");
        assert_eq!(storage.file_len(path).expect("len"), 11);
    }

    #[test]
    fn memory_replace_truncates() {
        let storage = memory_with_dir("/logs");
        let path = Path::new("/logs/a.txt");
        storage.add_file(path, b"old content".to_vec());

        storage
            .open(path, OpenMode::Replace)
            .and_then(|mut f| f.write_all(b"new"))
            .expect("replace");

        assert_eq!(storage.get_file(path), Some(b"new".to_vec()));
    }

    #[test]
    fn memory_create_or_open_keeps_content() {
        let storage = memory_with_dir("/logs");
        let path = Path::new("/logs/a.txt");
        storage.add_file(path, b"keep".to_vec());

        let _file = storage.open(path, OpenMode::CreateOrOpen).expect("open");
        assert_eq!(storage.get_file(path), Some(b"keep".to_vec()));

        let other = Path::new("/logs/b.txt");
        let _file = storage.open(other, OpenMode::CreateOrOpen).expect("create");
        assert_eq!(storage.file_len(other).expect("len"), 0);
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let storage = memory_with_dir("/logs");
        let path = Path::new("/logs/a.txt");
        storage.add_file(path, b"x".to_vec());

        let mut file = storage.open(path, OpenMode::ReadOnly).expect("open");
        let err = file.write_all(b"y").expect_err("read-only write");
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn memory_open_missing_parent_fails() {
        let storage = MemoryStorage::new();
        let err = storage
            .open(Path::new("/nowhere/a.txt"), OpenMode::Append)
            .expect_err("missing dir");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn memory_list_files_only_direct_children() {
        let storage = memory_with_dir("/logs");
        storage.add_file("/logs/b.txt", Vec::new());
        storage.add_file("/logs/a.txt", Vec::new());
        storage.add_file("/logs/nested/c.txt", Vec::new());

        let files = storage.list_files(Path::new("/logs")).expect("list");
        assert_eq!(
            files,
            vec![PathBuf::from("/logs/a.txt"), PathBuf::from("/logs/b.txt")]
        );
    }

    #[test]
    fn memory_move_and_delete() {
        let storage = memory_with_dir("/src");
        storage.create_dir_all(Path::new("/dst")).expect("dst");
        storage.add_file("/src/a.txt", b"data".to_vec());

        storage
            .move_file(Path::new("/src/a.txt"), Path::new("/dst/a.txt"))
            .expect("move");
        assert!(!storage.exists(Path::new("/src/a.txt")));
        assert!(storage.exists(Path::new("/dst/a.txt")));

        storage.delete(Path::new("/dst/a.txt")).expect("delete");
        assert_eq!(storage.file_count(), 0);
        assert!(storage.delete(Path::new("/dst/a.txt")).is_err());
    }

    #[test]
    fn memory_clones_share_state() {
        let storage = memory_with_dir("/logs");
        let other = storage.clone();
        storage.add_file("/logs/a.txt", b"1".to_vec());
        assert!(other.exists(Path::new("/logs/a.txt")));
    }

    // --- LocalStorage ---

    #[test]
    fn local_round_trip() {
        let dir = TempDir::new().expect("create temp dir");
        let storage = LocalStorage::new();
        let path = dir.path().join("a.txt");

        storage
            .open(&path, OpenMode::Append)
            .and_then(|mut f| f.write_all(b"abc"))
            .expect("append");
        storage
            .open(&path, OpenMode::Append)
            .and_then(|mut f| f.write_all(b"def"))
            .expect("append");

        assert!(storage.exists(&path));
        assert!(storage.directory_exists(dir.path()));
        assert!(!storage.exists(dir.path()));
        assert_eq!(storage.file_len(&path).expect("len"), 6);
        assert_eq!(storage.read_to_string(&path).expect("read"), "abcdef");

        storage
            .open(&path, OpenMode::Replace)
            .and_then(|mut f| f.write_all(b"z"))
            .expect("replace");
        assert_eq!(storage.read_to_string(&path).expect("read"), "z");
    }

    #[test]
    fn local_list_skips_directories() {
        let dir = TempDir::new().expect("create temp dir");
        let storage = LocalStorage::new();
        storage
            .create_dir_all(&dir.path().join("sub"))
            .expect("subdir");
        storage
            .open(&dir.path().join("b.txt"), OpenMode::CreateOrOpen)
            .expect("create");
        storage
            .open(&dir.path().join("a.txt"), OpenMode::CreateOrOpen)
            .expect("create");

        let files = storage.list_files(dir.path()).expect("list");
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[test]
    fn local_move_replaces_destination() {
        let dir = TempDir::new().expect("create temp dir");
        let storage = LocalStorage::new();
        let from = dir.path().join("from.txt");
        let to = dir.path().join("to.txt");
        std::fs::write(&from, "new").expect("write");
        std::fs::write(&to, "old").expect("write");

        storage.move_file(&from, &to).expect("move");
        assert!(!storage.exists(&from));
        assert_eq!(storage.read_to_string(&to).expect("read"), "new");
    }

    #[test]
    fn copy_then_remove_replaces_destination() {
        let dir = TempDir::new().expect("create temp dir");
        let from = dir.path().join("from.txt");
        let to = dir.path().join("to.txt");
        std::fs::write(&from, "new").expect("write");
        std::fs::write(&to, "older and longer").expect("write");

        copy_then_remove(&from, &to).expect("copy");
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).expect("read"), "new");
    }

    #[test]
    fn copy_then_remove_keeps_source_when_copy_fails() {
        let dir = TempDir::new().expect("create temp dir");
        let from = dir.path().join("from.txt");
        let to = dir.path().join("missing").join("to.txt");
        std::fs::write(&from, "data").expect("write");

        assert!(copy_then_remove(&from, &to).is_err());
        assert_eq!(std::fs::read_to_string(&from).expect("read"), "data");
    }

    #[cfg(unix)]
    #[test]
    fn local_move_crosses_filesystems() {
        use std::os::unix::fs::MetadataExt;

        // Needs a second mount; /dev/shm is tmpfs on most Linux hosts.
        let Ok(other) = TempDir::new_in("/dev/shm") else {
            return;
        };
        let dir = TempDir::new().expect("create temp dir");
        let dev = |p: &Path| std::fs::metadata(p).map(|m| m.dev()).ok();
        if dev(other.path()).is_none() || dev(other.path()) == dev(dir.path()) {
            return;
        }

        let storage = LocalStorage::new();
        let from = other.path().join("events.log");
        let to = dir.path().join("events.log");
        std::fs::write(&from, "rotated").expect("write");
        std::fs::write(&to, "stale").expect("write");

        storage.move_file(&from, &to).expect("move");
        assert!(!storage.exists(&from));
        assert_eq!(storage.read_to_string(&to).expect("read"), "rotated");
    }
}
