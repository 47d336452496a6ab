use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BuildError;
use crate::path::{normalize, AssetPath, RootKind};

fn default_dep_extension() -> String {
  "dep".to_string()
}

/// Where the three trees live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildConfig {
  pub raw: PathBuf,
  pub temp: PathBuf,
  pub bin: PathBuf,
  /// Extension appended to a raw file's relative path to name its
  /// dependency record under the temp root.
  #[serde(default = "default_dep_extension")]
  pub dep_extension: String,
}

impl BuildConfig {
  pub fn new(raw: impl Into<PathBuf>, temp: impl Into<PathBuf>, bin: impl Into<PathBuf>) -> Self {
    Self {
      raw: raw.into(),
      temp: temp.into(),
      bin: bin.into(),
      dep_extension: default_dep_extension(),
    }
  }

  /// `_raw`, `_temp` and `_bin` below `base`.
  pub fn under(base: impl AsRef<Path>) -> Self {
    let base = base.as_ref();
    Self::new(base.join("_raw"), base.join("_temp"), base.join("_bin"))
  }

  pub fn root(&self, kind: RootKind) -> &Path {
    match kind {
      RootKind::Raw => &self.raw,
      RootKind::Temp => &self.temp,
      RootKind::Bin => &self.bin,
    }
  }

  /// Roots must be non-empty and must not nest inside each other.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.dep_extension.is_empty() || self.dep_extension.contains(['/', '.']) {
      return Err(BuildError::Config(format!(
        "dep extension `{}` must be a plain non-empty extension",
        self.dep_extension
      )));
    }

    let roots = RootKind::ALL.map(|kind| (kind, normalize(self.root(kind))));
    for (kind, root) in &roots {
      if root.is_empty() {
        return Err(BuildError::Config(format!("{kind:?} root is empty")));
      }
    }
    for (i, (a_kind, a)) in roots.iter().enumerate() {
      for (b_kind, b) in &roots[i + 1..] {
        if is_within(a, b) || is_within(b, a) {
          return Err(BuildError::Config(format!(
            "{a_kind:?} root `{a}` and {b_kind:?} root `{b}` overlap"
          )));
        }
      }
    }
    Ok(())
  }

  /// Normalize `path` and tag it with the root it lives under.
  pub fn asset_path(&self, path: impl AsRef<Path>) -> AssetPath {
    let full = normalize(path.as_ref());
    for kind in RootKind::ALL {
      let root = normalize(self.root(kind));
      if is_within(&full, &root) {
        return AssetPath::with_root(full, kind, root.len());
      }
    }
    AssetPath::new(full)
  }

  /// Dependency record for a raw file: `<temp>/<relative>.<dep_extension>`.
  pub fn dep_path_for(&self, raw: &AssetPath) -> Option<AssetPath> {
    if raw.root() != Some(RootKind::Raw) {
      return None;
    }
    let dep = self
      .temp
      .join(format!("{}.{}", raw.relative(), self.dep_extension));
    Some(self.asset_path(dep))
  }

  /// Raw file a dependency record belongs to.
  pub fn provoking_path_for(&self, dep: &AssetPath) -> Option<AssetPath> {
    if !self.is_dep_record(dep) {
      return None;
    }
    let relative = dep.relative();
    let stem = &relative[..relative.len() - self.dep_extension.len() - 1];
    Some(self.asset_path(self.raw.join(stem)))
  }

  /// A file under the temp root ending in the dependency extension.
  pub fn is_dep_record(&self, path: &AssetPath) -> bool {
    path.root() == Some(RootKind::Temp)
      && path
        .relative()
        .strip_suffix(self.dep_extension.as_str())
        .is_some_and(|rest| rest.len() > 1 && rest.ends_with('.'))
  }

  /// Glob matching every dependency record.
  pub(crate) fn dep_pattern(&self) -> String {
    format!("*.{}", self.dep_extension)
  }
}

/// `path` equals `root` or lies below it.
fn is_within(path: &str, root: &str) -> bool {
  match path.strip_prefix(root) {
    Some(rest) => rest.is_empty() || rest.starts_with('/') || root.ends_with('/'),
    None => false,
  }
}
