//! Commands: one execution of a rule, identified by its dependency record.

use chrono::{DateTime, TimeDelta, Utc};

use crate::file::{File, FileId};
use crate::path::AssetPath;
use crate::rule::RuleId;

/// Index of a [`Command`] in the graph. Commands are never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub(crate) u32);

impl CommandId {
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
  Ok,
  Warning,
  Error,
  Dirty,
}

#[derive(Clone, Debug)]
pub struct Command {
  pub(crate) rule: RuleId,
  pub(crate) dep_path: AssetPath,
  /// Raw file that caused this command to exist. Always among the inputs.
  pub(crate) provoking: FileId,
  pub(crate) last_executed: Option<DateTime<Utc>>,
  /// Rule version recorded at the last execution, -1 if unknown.
  pub(crate) recorded_version: i64,
  pub(crate) state: CommandState,
  pub(crate) message: Option<String>,
  pub(crate) inputs: Vec<FileId>,
  pub(crate) outputs: Vec<FileId>,
  pub(crate) queued: bool,
}

impl Command {
  pub(crate) fn new(rule: RuleId, dep_path: AssetPath, provoking: FileId) -> Self {
    Self {
      rule,
      dep_path,
      provoking,
      last_executed: None,
      recorded_version: -1,
      state: CommandState::Dirty,
      message: None,
      inputs: vec![provoking],
      outputs: Vec::new(),
      queued: false,
    }
  }

  #[inline]
  pub fn rule(&self) -> RuleId {
    self.rule
  }

  /// Path of the dependency record, which is also the command's identity.
  #[inline]
  pub fn dep_path(&self) -> &AssetPath {
    &self.dep_path
  }

  #[inline]
  pub fn provoking(&self) -> FileId {
    self.provoking
  }

  #[inline]
  pub fn last_executed(&self) -> Option<DateTime<Utc>> {
    self.last_executed
  }

  #[inline]
  pub fn recorded_version(&self) -> i64 {
    self.recorded_version
  }

  #[inline]
  pub fn state(&self) -> CommandState {
    self.state
  }

  /// Message left by the rule or the graph for the last run.
  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  pub fn inputs(&self) -> &[FileId] {
    &self.inputs
  }

  pub fn outputs(&self) -> &[FileId] {
    &self.outputs
  }

  #[inline]
  pub fn is_queued(&self) -> bool {
    self.queued
  }

  /// Whether the command has to run again.
  ///
  /// Dirty when the rule version went up, it never ran, any input is missing
  /// or newer than the last run, or any output is missing or older than the
  /// last run. `slack` widens the output comparison for filesystems whose
  /// timestamps are coarser than the clock.
  pub fn is_dirty(&self, rule_version: i64, files: &[File], slack: TimeDelta) -> bool {
    if rule_version > self.recorded_version {
      return true;
    }
    let Some(last) = self.last_executed else {
      return true;
    };

    let stale_input = self.inputs.iter().any(|id| {
      let file = &files[id.index()];
      match file.modified() {
        Some(modified) => file.is_missing() || modified > last,
        None => true,
      }
    });

    let stale_output = self.outputs.iter().any(|id| {
      let file = &files[id.index()];
      match file.modified() {
        Some(modified) => file.is_missing() || modified + slack < last,
        None => true,
      }
    });

    stale_input || stale_output
  }

  /// True when every input is gone, so the outputs should be removed
  /// instead of rebuilt. A command without inputs is never cleaned.
  pub fn needs_clean(&self, files: &[File]) -> bool {
    !self.inputs.is_empty() && self.inputs.iter().all(|id| files[id.index()].is_missing())
  }

  /// Some but not all inputs are gone.
  pub fn has_missing_input(&self, files: &[File]) -> bool {
    self.inputs.iter().any(|id| files[id.index()].is_missing())
  }
}

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;
