//! Tracked files.

use chrono::{DateTime, Utc};

use crate::command::CommandId;
use crate::path::{AssetPath, RootKind};

/// Index of a [`File`] in the graph. Files are never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

impl FileId {
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
  Ok,
  Missing,
}

/// A file known to the graph, present on disk or not.
#[derive(Clone, Debug)]
pub struct File {
  pub(crate) path: AssetPath,
  pub(crate) modified: Option<DateTime<Utc>>,
  pub(crate) state: FileState,
  /// Commands reading this file.
  pub(crate) commands_in: Vec<CommandId>,
  /// Commands writing this file.
  pub(crate) commands_out: Vec<CommandId>,
}

impl File {
  pub(crate) fn new(path: AssetPath) -> Self {
    Self {
      path,
      modified: None,
      state: FileState::Missing,
      commands_in: Vec::new(),
      commands_out: Vec::new(),
    }
  }

  /// Record what the filesystem reports; `None` means the file is gone.
  pub(crate) fn observe(&mut self, modified: Option<DateTime<Utc>>) {
    self.modified = modified;
    self.state = if modified.is_some() {
      FileState::Ok
    } else {
      FileState::Missing
    };
  }

  #[inline]
  pub fn path(&self) -> &AssetPath {
    &self.path
  }

  #[inline]
  pub fn root(&self) -> Option<RootKind> {
    self.path.root()
  }

  #[inline]
  pub fn modified(&self) -> Option<DateTime<Utc>> {
    self.modified
  }

  #[inline]
  pub fn state(&self) -> FileState {
    self.state
  }

  #[inline]
  pub fn is_missing(&self) -> bool {
    self.state == FileState::Missing
  }

  pub fn commands_in(&self) -> &[CommandId] {
    &self.commands_in
  }

  pub fn commands_out(&self) -> &[CommandId] {
    &self.commands_out
  }
}
