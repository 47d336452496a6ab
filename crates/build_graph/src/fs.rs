//! Filesystem seam: the graph only touches files through [`FileSystem`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use walkdir::WalkDir;

use crate::path::normalize;
use crate::pattern::matches_pattern;

pub trait FileSystem: Send + Sync {
  /// Files below `root` whose name matches `pattern`, recursively, sorted.
  /// A missing root yields an empty list.
  fn list_files(&self, root: &Path, pattern: &str) -> io::Result<Vec<PathBuf>>;

  fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
  }

  /// Write a whole file, creating parent directories.
  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

  fn remove(&self, path: &Path) -> io::Result<()>;

  /// Last modification time, `None` when the file does not exist.
  fn modified(&self, path: &Path) -> Option<DateTime<Utc>>;

  fn now(&self) -> DateTime<Utc>;

  /// How far an output may lag behind the recorded run time and still count
  /// as fresh.
  fn mtime_slack(&self) -> TimeDelta {
    TimeDelta::zero()
  }
}

/// The real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn list_files(&self, root: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    if !root.exists() {
      return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
      let entry = entry.map_err(io::Error::from)?;
      if entry.file_type().is_file() && matches_pattern(pattern, &entry.file_name().to_string_lossy()) {
        files.push(entry.into_path());
      }
    }
    Ok(files)
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    std::fs::read(path)
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
  }

  fn remove(&self, path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
  }

  fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
      return None;
    }
    metadata.modified().ok().map(DateTime::<Utc>::from)
  }

  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  fn mtime_slack(&self) -> TimeDelta {
    TimeDelta::seconds(1)
  }
}

struct MemoryFile {
  contents: Vec<u8>,
  modified: DateTime<Utc>,
}

struct MemoryState {
  files: BTreeMap<String, MemoryFile>,
  now: DateTime<Utc>,
}

/// In-memory filesystem with a manual clock. Writes are stamped with the
/// current clock value, which only moves on [`advance`](Self::advance).
pub struct MemoryFileSystem {
  state: Mutex<MemoryState>,
}

impl Default for MemoryFileSystem {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryFileSystem {
  pub fn new() -> Self {
    Self::starting_at(DateTime::UNIX_EPOCH)
  }

  pub fn starting_at(now: DateTime<Utc>) -> Self {
    Self {
      state: Mutex::new(MemoryState {
        files: BTreeMap::new(),
        now,
      }),
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn advance(&self, delta: TimeDelta) {
    let mut state = self.lock();
    state.now += delta;
  }

  /// Override a file's timestamp without touching its contents.
  pub fn set_modified(&self, path: impl AsRef<Path>, modified: DateTime<Utc>) -> bool {
    let mut state = self.lock();
    match state.files.get_mut(&normalize(path.as_ref())) {
      Some(file) => {
        file.modified = modified;
        true
      }
      None => false,
    }
  }

  pub fn exists(&self, path: impl AsRef<Path>) -> bool {
    self.lock().files.contains_key(&normalize(path.as_ref()))
  }

  pub fn file_count(&self) -> usize {
    self.lock().files.len()
  }
}

impl FileSystem for MemoryFileSystem {
  fn list_files(&self, root: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    let mut prefix = normalize(root);
    if !prefix.is_empty() && !prefix.ends_with('/') {
      prefix.push('/');
    }

    let state = self.lock();
    Ok(
      state
        .files
        .keys()
        .filter(|key| key.starts_with(&prefix))
        .filter(|key| {
          let name = key.rsplit('/').next().unwrap_or(key);
          matches_pattern(pattern, name)
        })
        .map(PathBuf::from)
        .collect(),
    )
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    self
      .lock()
      .files
      .get(&normalize(path))
      .map(|file| file.contents.clone())
      .ok_or_else(|| not_found(path))
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut state = self.lock();
    let modified = state.now;
    state.files.insert(
      normalize(path),
      MemoryFile {
        contents: contents.to_vec(),
        modified,
      },
    );
    Ok(())
  }

  fn remove(&self, path: &Path) -> io::Result<()> {
    self
      .lock()
      .files
      .remove(&normalize(path))
      .map(|_| ())
      .ok_or_else(|| not_found(path))
  }

  fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
    self.lock().files.get(&normalize(path)).map(|file| file.modified)
  }

  fn now(&self) -> DateTime<Utc> {
    self.lock().now
  }
}

fn not_found(path: &Path) -> io::Error {
  io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

#[cfg(test)]
#[path = "fs_test.rs"]
mod fs_test;
