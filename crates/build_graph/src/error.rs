use std::path::PathBuf;

/// Errors surfaced by the build graph.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
  #[error("i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid build configuration: {0}")]
  Config(String),

  #[error("malformed dependency record {path}:{line}: {reason}")]
  DepRecord {
    path: PathBuf,
    line: usize,
    reason: String,
  },

  #[error("dependency record {path} names unknown rule `{rule}`")]
  UnknownRule { path: PathBuf, rule: String },

  #[error("rule `{0}` is registered twice")]
  DuplicateRule(String),
}

impl BuildError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
