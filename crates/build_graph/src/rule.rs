//! Rules turn raw files into outputs.

use std::path::{Path, PathBuf};

use crate::command::{CommandId, CommandState};
use crate::config::BuildConfig;
use crate::fs::FileSystem;
use crate::pattern::matches_pattern;

/// Index of a registered rule; lower ids run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// What a rule may touch while it runs.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
  pub fs: &'a dyn FileSystem,
  pub config: &'a BuildConfig,
}

/// A transformation from raw files matching [`pattern`](Rule::pattern) to
/// outputs. Rules run in batches, possibly on worker threads, and must not
/// keep mutable state.
pub trait Rule: Send + Sync {
  /// Unique name, stored in dependency records.
  fn name(&self) -> &str;

  /// Glob matched against raw file names.
  fn pattern(&self) -> &str;

  /// Bumping the version rebuilds every command of this rule.
  fn version(&self) -> i64;

  /// Called once for newly created commands, before the first dirty check.
  /// Rules may declare extra inputs or expected outputs here.
  fn init(&self, _ctx: &RuleContext<'_>, _jobs: &mut [Job]) {}

  /// Run every job. Each job must end in `Ok`, `Warning` or `Error`.
  fn execute(&self, ctx: &RuleContext<'_>, jobs: &mut [Job]);

  fn matches(&self, file_name: &str) -> bool {
    matches_pattern(self.pattern(), file_name)
  }
}

/// A command as seen by its rule.
#[derive(Clone, Debug)]
pub struct Job {
  pub command: CommandId,
  /// Raw file that provoked the command.
  pub provoking: PathBuf,
  /// `provoking` relative to the raw root.
  pub relative: PathBuf,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  pub state: CommandState,
  pub message: Option<String>,
}

impl Job {
  pub fn succeed(&mut self) {
    self.state = CommandState::Ok;
    self.message = None;
  }

  pub fn warn(&mut self, message: impl Into<String>) {
    self.state = CommandState::Warning;
    self.message = Some(message.into());
  }

  pub fn fail(&mut self, message: impl Into<String>) {
    self.state = CommandState::Error;
    self.message = Some(message.into());
  }

  pub fn add_input(&mut self, path: impl AsRef<Path>) {
    let path = path.as_ref();
    if !self.inputs.iter().any(|p| p == path) {
      self.inputs.push(path.to_path_buf());
    }
  }

  pub fn add_output(&mut self, path: impl AsRef<Path>) {
    let path = path.as_ref();
    if !self.outputs.iter().any(|p| p == path) {
      self.outputs.push(path.to_path_buf());
    }
  }
}
