//! Normalized asset paths.
//!
//! A path is stored once as a normalized string (forward slashes, no `./`,
//! no trailing slash) with offsets for its parts:
//!
//! ```text
//! assets/_raw/textures/stone.tex.png
//! |----root--|--dir---|name|type|ext
//! ```
//!
//! The name ends at the first '.' of the file name, the type sits between the
//! first and second '.', and the extension is everything after the second
//! '.' (or after the first when there is only one).

use std::fmt;
use std::path::{Path, PathBuf};

/// Which configured root a path lives under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootKind {
  /// Source data, provokes commands.
  Raw,
  /// Intermediate data and dependency records.
  Temp,
  /// Final build outputs.
  Bin,
}

impl RootKind {
  pub const ALL: [RootKind; 3] = [RootKind::Raw, RootKind::Temp, RootKind::Bin];
}

/// Stable 64-bit identity of a normalized path (FNV-1a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathHash(pub u64);

impl PathHash {
  const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
  const PRIME: u64 = 0x0000_0100_0000_01b3;

  pub fn of(normalized: &str) -> Self {
    let mut hash = Self::OFFSET_BASIS;
    for byte in normalized.bytes() {
      hash ^= byte as u64;
      hash = hash.wrapping_mul(Self::PRIME);
    }
    Self(hash)
  }

  /// Hash of an arbitrary path after normalization.
  pub fn of_path(path: &Path) -> Self {
    Self::of(&normalize(path))
  }
}

/// Normalize separators and strip redundant pieces.
pub fn normalize(path: &Path) -> String {
  let raw = path.to_string_lossy().replace('\\', "/");
  let mut out = String::with_capacity(raw.len());
  if raw.starts_with('/') {
    out.push('/');
  }
  for part in raw.split('/') {
    if part.is_empty() || part == "." {
      continue;
    }
    if !out.is_empty() && !out.ends_with('/') {
      out.push('/');
    }
    out.push_str(part);
  }
  out
}

/// A normalized path split into root, directory, name, type and extension.
#[derive(Clone, PartialEq, Eq)]
pub struct AssetPath {
  full: String,
  root: Option<RootKind>,
  /// Length of the root prefix (without the separator).
  root_len: usize,
  /// First byte after the root and its separator.
  path_offset: usize,
  /// First byte of the file name.
  name_offset: usize,
  /// First '.' in the file name, if any.
  first_dot: Option<usize>,
  /// Second '.' in the file name, if any.
  second_dot: Option<usize>,
  hash: PathHash,
}

impl AssetPath {
  /// Path outside any configured root.
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self::parse(normalize(path.as_ref()), None, 0)
  }

  /// Path under `root`, whose normalized prefix is `root_len` bytes long.
  pub(crate) fn with_root(normalized: String, root: RootKind, root_len: usize) -> Self {
    Self::parse(normalized, Some(root), root_len)
  }

  fn parse(full: String, root: Option<RootKind>, root_len: usize) -> Self {
    let path_offset = if root.is_some() {
      (root_len + 1).min(full.len())
    } else {
      0
    };
    let name_offset = full[path_offset..]
      .rfind('/')
      .map(|i| path_offset + i + 1)
      .unwrap_or(path_offset);
    let first_dot = full[name_offset..].find('.').map(|i| name_offset + i);
    let second_dot = first_dot.and_then(|d| full[d + 1..].find('.').map(|i| d + 1 + i));
    let hash = PathHash::of(&full);

    Self {
      full,
      root,
      root_len,
      path_offset,
      name_offset,
      first_dot,
      second_dot,
      hash,
    }
  }

  #[inline]
  pub fn as_str(&self) -> &str {
    &self.full
  }

  #[inline]
  pub fn as_path(&self) -> &Path {
    Path::new(&self.full)
  }

  pub fn to_path_buf(&self) -> PathBuf {
    PathBuf::from(&self.full)
  }

  #[inline]
  pub fn hash(&self) -> PathHash {
    self.hash
  }

  #[inline]
  pub fn root(&self) -> Option<RootKind> {
    self.root
  }

  /// The root prefix, empty for paths outside every root.
  pub fn root_str(&self) -> &str {
    &self.full[..self.root_len]
  }

  /// Everything after the root.
  pub fn relative(&self) -> &str {
    &self.full[self.path_offset..]
  }

  /// Directory between the root and the file name, with trailing '/'.
  pub fn dir(&self) -> &str {
    &self.full[self.path_offset..self.name_offset]
  }

  pub fn file_name(&self) -> &str {
    &self.full[self.name_offset..]
  }

  /// File name up to the first '.'.
  pub fn name(&self) -> &str {
    let end = self.first_dot.unwrap_or(self.full.len());
    &self.full[self.name_offset..end]
  }

  /// Part between the first and second '.', empty with fewer than two.
  pub fn file_type(&self) -> &str {
    match (self.first_dot, self.second_dot) {
      (Some(first), Some(second)) => &self.full[first + 1..second],
      _ => "",
    }
  }

  /// Part after the second '.', or after the first when there is only one.
  pub fn extension(&self) -> &str {
    match (self.first_dot, self.second_dot) {
      (_, Some(second)) => &self.full[second + 1..],
      (Some(first), None) => &self.full[first + 1..],
      _ => "",
    }
  }
}

impl fmt::Display for AssetPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.full)
  }
}

impl fmt::Debug for AssetPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "AssetPath({:?}, {:?})", self.full, self.root)
  }
}
