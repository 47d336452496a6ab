//! BuildGraph - files, commands and the dirty queue.
//!
//! # Lifecycle
//!
//! 1. **Startup**: dependency records under the temp root rebuild the known
//!    commands, then all three roots are scanned for files. Raw files that
//!    match a rule but have no record get a fresh command.
//! 2. **Evaluation**: every command is checked for dirtiness and dirty ones
//!    are queued.
//! 3. **Notifications**: [`BuildGraph::dispatch_notification`] updates one
//!    file and re-evaluates the commands reading or writing it.
//! 4. **Processing**: [`BuildGraph::process_queue`] cleans orphaned
//!    commands, fails commands with missing inputs, and runs the rest in
//!    per-rule batches.
//!
//! Rules only see [`Job`]s. Their results are applied to the graph serially
//! once every batch has finished.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandId, CommandState};
use crate::config::BuildConfig;
use crate::depfile::DepRecord;
use crate::error::BuildError;
use crate::file::{File, FileId};
use crate::fs::{FileSystem, OsFileSystem};
use crate::path::{AssetPath, PathHash, RootKind};
use crate::rule::{Job, Rule, RuleContext, RuleId};

/// Kind of change reported by a file watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAction {
  Created,
  Modified,
  Deleted,
}

/// Outcome counters for one [`BuildGraph::process_queue`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
  /// Commands handed to a rule.
  pub executed: usize,
  pub ok: usize,
  pub warnings: usize,
  /// Failed executions plus commands refused for missing inputs.
  pub errors: usize,
  /// Commands whose inputs were all gone.
  pub cleaned: usize,
}

/// Jobs of one rule, executed together.
struct Batch {
  rule: RuleId,
  jobs: Vec<Job>,
}

pub struct BuildGraph<F: FileSystem = OsFileSystem> {
  config: BuildConfig,
  fs: F,
  rules: Vec<Box<dyn Rule>>,
  files: Vec<File>,
  file_index: HashMap<PathHash, FileId>,
  commands: Vec<Command>,
  command_index: HashMap<PathHash, CommandId>,
  queue: Vec<CommandId>,
}

impl<F: FileSystem> BuildGraph<F> {
  /// Scan the roots and queue every dirty command.
  ///
  /// Rules are tried in registration order, both for matching raw files and
  /// for processing the queue.
  #[tracing::instrument(skip_all, name = "build_graph::new")]
  pub fn new(config: BuildConfig, rules: Vec<Box<dyn Rule>>, fs: F) -> Result<Self, BuildError> {
    config.validate()?;

    {
      let mut names = HashSet::new();
      for rule in &rules {
        if !names.insert(rule.name()) {
          return Err(BuildError::DuplicateRule(rule.name().to_owned()));
        }
      }
    }

    let mut graph = Self {
      config,
      fs,
      rules,
      files: Vec::new(),
      file_index: HashMap::new(),
      commands: Vec::new(),
      command_index: HashMap::new(),
      queue: Vec::new(),
    };

    graph.scan_dep_records()?;
    graph.scan_roots()?;

    let created = graph.create_missing_commands();
    graph.init_commands(&created);

    for index in 0..graph.commands.len() {
      graph.evaluate(CommandId(index as u32));
    }

    info!(
      files = graph.files.len(),
      commands = graph.commands.len(),
      created = created.len(),
      queued = graph.queue.len(),
      "build graph ready"
    );
    Ok(graph)
  }

  #[inline]
  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  #[inline]
  pub fn fs(&self) -> &F {
    &self.fs
  }

  /// Give the filesystem back, e.g. to start a fresh graph over it.
  pub fn into_fs(self) -> F {
    self.fs
  }

  pub fn rule(&self, id: RuleId) -> &dyn Rule {
    self.rules[id.index()].as_ref()
  }

  pub fn rule_id(&self, name: &str) -> Option<RuleId> {
    self
      .rules
      .iter()
      .position(|rule| rule.name() == name)
      .map(|index| RuleId(index as u32))
  }

  pub fn find_file(&self, hash: PathHash) -> Option<&File> {
    self.file_index.get(&hash).map(|id| &self.files[id.index()])
  }

  pub fn find_file_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
    self
      .file_index
      .get(&self.config.asset_path(path).hash())
      .copied()
  }

  pub fn find_file_by_path(&self, path: impl AsRef<Path>) -> Option<&File> {
    self.find_file(self.config.asset_path(path).hash())
  }

  #[inline]
  pub fn file(&self, id: FileId) -> &File {
    &self.files[id.index()]
  }

  pub fn files(&self) -> impl Iterator<Item = (FileId, &File)> + '_ {
    self
      .files
      .iter()
      .enumerate()
      .map(|(index, file)| (FileId(index as u32), file))
  }

  #[inline]
  pub fn command(&self, id: CommandId) -> &Command {
    &self.commands[id.index()]
  }

  pub fn commands(&self) -> impl Iterator<Item = (CommandId, &Command)> + '_ {
    self
      .commands
      .iter()
      .enumerate()
      .map(|(index, command)| (CommandId(index as u32), command))
  }

  /// Command owning the dependency record at `dep_path`.
  pub fn find_command(&self, dep_path: impl AsRef<Path>) -> Option<CommandId> {
    self
      .command_index
      .get(&self.config.asset_path(dep_path).hash())
      .copied()
  }

  /// Queued commands in the order they were queued.
  pub fn queue(&self) -> &[CommandId] {
    &self.queue
  }

  pub fn is_dirty(&self, id: CommandId) -> bool {
    let command = &self.commands[id.index()];
    command.is_dirty(
      self.rules[command.rule.index()].version(),
      &self.files,
      self.fs.mtime_slack(),
    )
  }

  /// Apply one watcher event. Returns how many commands were newly queued.
  pub fn dispatch_notification(&mut self, path: impl AsRef<Path>, action: FileAction) -> usize {
    let before = self.queue.len();
    let asset = self.config.asset_path(path);

    if self.config.is_dep_record(&asset) {
      // Records are written by the graph itself; only a lost record matters
      if action == FileAction::Deleted {
        if let Some(&id) = self.command_index.get(&asset.hash()) {
          debug!(record = %asset, "dependency record deleted");
          self.enqueue(id);
        }
      }
      return self.queue.len() - before;
    }

    let modified = match action {
      FileAction::Deleted => None,
      FileAction::Created | FileAction::Modified => self.fs.modified(asset.as_path()),
    };
    let file = self.find_or_add_file(asset);
    self.files[file.index()].observe(modified);

    if action != FileAction::Deleted && self.files[file.index()].root() == Some(RootKind::Raw) {
      if let Some(id) = self.command_for_raw(file) {
        debug!(record = %self.commands[id.index()].dep_path, "new command");
        self.init_commands(&[id]);
      }
    }

    // Readers always rerun, even when the new mtime does not move forward.
    // Writers are only re-checked so a rule's own output does not requeue it.
    let file = &self.files[file.index()];
    let readers = file.commands_in.clone();
    let writers = file.commands_out.clone();
    for id in readers {
      self.enqueue(id);
    }
    for id in writers {
      if action == FileAction::Deleted {
        self.enqueue(id);
      } else {
        self.evaluate(id);
      }
    }

    self.queue.len() - before
  }

  /// Drain the queue.
  ///
  /// Commands run grouped by rule, in rule registration order. Batches of
  /// different rules may run in parallel; every executed command is stamped
  /// with the time its batch started.
  #[tracing::instrument(skip_all, name = "build_graph::process_queue")]
  pub fn process_queue(&mut self) -> BuildReport {
    let mut report = BuildReport::default();
    let mut queue = std::mem::take(&mut self.queue);
    for id in &queue {
      self.commands[id.index()].queued = false;
    }
    queue.sort_by_key(|id| self.commands[id.index()].rule);

    let mut runnable = Vec::with_capacity(queue.len());
    for id in queue {
      let command = &self.commands[id.index()];
      if command.needs_clean(&self.files) {
        self.clean(id);
        report.cleaned += 1;
      } else if command.has_missing_input(&self.files) {
        self.fail(id, "input file is missing".to_owned());
        report.errors += 1;
      } else {
        runnable.push(id);
      }
    }

    if !runnable.is_empty() {
      let mut batches = self.batches(&runnable);
      let started = self.fs.now();

      let ctx = RuleContext {
        fs: &self.fs,
        config: &self.config,
      };
      let rules = &self.rules;
      batches.par_iter_mut().for_each(|batch| {
        let rule = &rules[batch.rule.index()];
        debug!(rule = rule.name(), jobs = batch.jobs.len(), "executing batch");
        rule.execute(&ctx, &mut batch.jobs);
      });

      for batch in batches {
        for job in batch.jobs {
          self.apply_result(job, started, &mut report);
        }
      }
    }

    info!(
      executed = report.executed,
      ok = report.ok,
      warnings = report.warnings,
      errors = report.errors,
      cleaned = report.cleaned,
      "processed build queue"
    );
    report
  }

  fn scan_dep_records(&mut self) -> Result<(), BuildError> {
    let temp = self.config.temp.clone();
    let records = self
      .fs
      .list_files(&temp, &self.config.dep_pattern())
      .map_err(|err| BuildError::io(&temp, err))?;

    for path in records {
      let dep_path = self.config.asset_path(&path);
      if !self.config.is_dep_record(&dep_path) {
        continue;
      }
      if let Err(err) = self.load_dep_record(dep_path) {
        warn!(%err, "skipping dependency record");
      }
    }
    Ok(())
  }

  fn load_dep_record(&mut self, dep_path: AssetPath) -> Result<(), BuildError> {
    let text = self
      .fs
      .read_to_string(dep_path.as_path())
      .map_err(|err| BuildError::io(dep_path.to_path_buf(), err))?;

    let record = DepRecord::read(&text).map_err(|err| BuildError::DepRecord {
      path: dep_path.to_path_buf(),
      line: err.line,
      reason: err.reason,
    })?;

    let rule = self
      .rule_id(&record.rule)
      .ok_or_else(|| BuildError::UnknownRule {
        path: dep_path.to_path_buf(),
        rule: record.rule.clone(),
      })?;

    let provoking_path =
      self
        .config
        .provoking_path_for(&dep_path)
        .ok_or_else(|| BuildError::DepRecord {
          path: dep_path.to_path_buf(),
          line: 0,
          reason: "record is not below the temp root".into(),
        })?;

    let provoking = self.add_unobserved_file(provoking_path);
    let id = self.add_command(Command::new(rule, dep_path, provoking));

    let inputs: Vec<FileId> = record
      .inputs
      .iter()
      .map(|path| self.add_unobserved_path(Path::new(path)))
      .collect();
    let outputs: Vec<FileId> = record
      .outputs
      .iter()
      .map(|path| self.add_unobserved_path(Path::new(path)))
      .collect();
    self.link(id, inputs, outputs);

    let command = &mut self.commands[id.index()];
    command.last_executed = record.timestamp;
    command.recorded_version = record.version;
    Ok(())
  }

  fn scan_roots(&mut self) -> Result<(), BuildError> {
    for kind in RootKind::ALL {
      let root = self.config.root(kind).to_path_buf();
      let paths = self
        .fs
        .list_files(&root, "*")
        .map_err(|err| BuildError::io(&root, err))?;

      for path in paths {
        let asset = self.config.asset_path(&path);
        if self.config.is_dep_record(&asset) {
          continue;
        }
        let modified = self.fs.modified(&path);
        let id = self.find_or_add_file(asset);
        self.files[id.index()].observe(modified);
      }
    }

    // Records may name files outside every root; the listings above never see them
    for index in 0..self.files.len() {
      if self.files[index].root().is_none() {
        let modified = self.fs.modified(self.files[index].path.as_path());
        self.files[index].observe(modified);
      }
    }
    Ok(())
  }

  /// Commands for present raw files that match a rule but have no record.
  fn create_missing_commands(&mut self) -> Vec<CommandId> {
    let raw_files: Vec<FileId> = self
      .files()
      .filter(|(_, file)| file.root() == Some(RootKind::Raw) && !file.is_missing())
      .map(|(id, _)| id)
      .collect();

    raw_files
      .into_iter()
      .filter_map(|file| self.command_for_raw(file))
      .collect()
  }

  /// Create the command for a raw file, if a rule wants it and it does not
  /// exist yet.
  fn command_for_raw(&mut self, file: FileId) -> Option<CommandId> {
    let path = &self.files[file.index()].path;
    let dep_path = self.config.dep_path_for(path)?;
    if self.command_index.contains_key(&dep_path.hash()) {
      return None;
    }
    let rule = self.rule_for(path.file_name())?;
    Some(self.add_command(Command::new(rule, dep_path, file)))
  }

  fn rule_for(&self, file_name: &str) -> Option<RuleId> {
    self
      .rules
      .iter()
      .position(|rule| rule.matches(file_name))
      .map(|index| RuleId(index as u32))
  }

  fn add_command(&mut self, command: Command) -> CommandId {
    let id = CommandId(self.commands.len() as u32);
    self.command_index.insert(command.dep_path.hash(), id);
    self.files[command.provoking.index()].commands_in.push(id);
    self.commands.push(command);
    id
  }

  fn find_or_add_file(&mut self, path: AssetPath) -> FileId {
    if let Some(&id) = self.file_index.get(&path.hash()) {
      return id;
    }

    let modified = self.fs.modified(path.as_path());
    let id = self.add_unobserved_file(path);
    self.files[id.index()].observe(modified);
    id
  }

  fn find_or_add_path(&mut self, path: &Path) -> FileId {
    let asset = self.config.asset_path(path);
    self.find_or_add_file(asset)
  }

  /// Track `path` without asking the filesystem; it stays `Missing` until a
  /// scan or notification observes it.
  fn add_unobserved_file(&mut self, path: AssetPath) -> FileId {
    if let Some(&id) = self.file_index.get(&path.hash()) {
      return id;
    }

    let id = FileId(self.files.len() as u32);
    self.file_index.insert(path.hash(), id);
    self.files.push(File::new(path));
    id
  }

  fn add_unobserved_path(&mut self, path: &Path) -> FileId {
    let asset = self.config.asset_path(path);
    self.add_unobserved_file(asset)
  }

  /// Replace a command's inputs and outputs, keeping the back-references on
  /// files in sync. The provoking file always stays the first input.
  fn link(&mut self, id: CommandId, mut inputs: Vec<FileId>, mut outputs: Vec<FileId>) {
    let provoking = self.commands[id.index()].provoking;
    inputs.retain(|&file| file != provoking);
    inputs.insert(0, provoking);
    dedup_ids(&mut inputs);
    dedup_ids(&mut outputs);

    let command = &mut self.commands[id.index()];
    let old_inputs = std::mem::replace(&mut command.inputs, inputs.clone());
    let old_outputs = std::mem::replace(&mut command.outputs, outputs.clone());

    for file in old_inputs {
      self.files[file.index()].commands_in.retain(|&c| c != id);
    }
    for file in old_outputs {
      self.files[file.index()].commands_out.retain(|&c| c != id);
    }
    for file in inputs {
      self.files[file.index()].commands_in.push(id);
    }
    for file in outputs {
      self.files[file.index()].commands_out.push(id);
    }
  }

  fn job(&self, id: CommandId) -> Job {
    let command = &self.commands[id.index()];
    let provoking = &self.files[command.provoking.index()].path;
    let paths = |ids: &[FileId]| -> Vec<PathBuf> {
      ids
        .iter()
        .map(|file| self.files[file.index()].path.to_path_buf())
        .collect()
    };

    Job {
      command: id,
      provoking: provoking.to_path_buf(),
      relative: PathBuf::from(provoking.relative()),
      inputs: paths(&command.inputs),
      outputs: paths(&command.outputs),
      state: CommandState::Dirty,
      message: None,
    }
  }

  /// Group commands by rule, rules in registration order.
  fn batches(&self, ids: &[CommandId]) -> Vec<Batch> {
    let mut by_rule: BTreeMap<RuleId, Vec<Job>> = BTreeMap::new();
    for &id in ids {
      by_rule
        .entry(self.commands[id.index()].rule)
        .or_default()
        .push(self.job(id));
    }
    by_rule
      .into_iter()
      .map(|(rule, jobs)| Batch { rule, jobs })
      .collect()
  }

  fn init_commands(&mut self, ids: &[CommandId]) {
    if ids.is_empty() {
      return;
    }

    let mut batches = self.batches(ids);
    let ctx = RuleContext {
      fs: &self.fs,
      config: &self.config,
    };
    for batch in &mut batches {
      self.rules[batch.rule.index()].init(&ctx, &mut batch.jobs);
    }

    for batch in batches {
      for job in batch.jobs {
        self.apply_links(&job);
      }
    }
  }

  fn apply_links(&mut self, job: &Job) {
    let inputs = job
      .inputs
      .iter()
      .map(|path| self.find_or_add_path(path))
      .collect();
    let outputs = job
      .outputs
      .iter()
      .map(|path| self.find_or_add_path(path))
      .collect();
    self.link(job.command, inputs, outputs);
  }

  fn apply_result(&mut self, job: Job, started: DateTime<Utc>, report: &mut BuildReport) {
    let id = job.command;
    report.executed += 1;
    self.apply_links(&job);

    // Pick up what the rule just wrote
    let command = &self.commands[id.index()];
    let touched: Vec<FileId> = command
      .inputs
      .iter()
      .chain(&command.outputs)
      .copied()
      .collect();
    for file in touched {
      let modified = self.fs.modified(self.files[file.index()].path.as_path());
      self.files[file.index()].observe(modified);
    }

    let (state, message) = match job.state {
      CommandState::Dirty => (
        CommandState::Error,
        Some("rule finished without resolving the job".to_owned()),
      ),
      state => (state, job.message),
    };

    if state == CommandState::Error {
      self.fail(id, message.unwrap_or_else(|| "rule reported an error".to_owned()));
      report.errors += 1;
      return;
    }

    let version = self.rules[self.commands[id.index()].rule.index()].version();
    let command = &mut self.commands[id.index()];
    command.state = state;
    command.message = message;
    command.last_executed = Some(started);
    command.recorded_version = version;

    if let Err(err) = self.write_dep_record(id) {
      self.fail(id, err.to_string());
      report.errors += 1;
      return;
    }

    if state == CommandState::Warning {
      warn!(
        command = %self.commands[id.index()].dep_path,
        message = self.commands[id.index()].message(),
        "command finished with warning"
      );
      report.warnings += 1;
    } else {
      report.ok += 1;
    }
  }

  fn write_dep_record(&self, id: CommandId) -> Result<(), BuildError> {
    let command = &self.commands[id.index()];
    let paths = |ids: &[FileId]| -> Vec<String> {
      ids
        .iter()
        .map(|file| self.files[file.index()].path.as_str().to_owned())
        .collect()
    };

    let record = DepRecord {
      rule: self.rules[command.rule.index()].name().to_owned(),
      version: command.recorded_version,
      timestamp: command.last_executed,
      inputs: paths(&command.inputs),
      outputs: paths(&command.outputs),
    };

    self
      .fs
      .write(command.dep_path.as_path(), record.write().as_bytes())
      .map_err(|err| BuildError::io(command.dep_path.to_path_buf(), err))
  }

  /// Remove outputs and the record of a command whose inputs are all gone.
  fn clean(&mut self, id: CommandId) {
    let outputs = std::mem::take(&mut self.commands[id.index()].outputs);
    for file in outputs {
      let file = &mut self.files[file.index()];
      file.commands_out.retain(|&c| c != id);
      remove_quietly(&self.fs, file.path.as_path());
      let modified = self.fs.modified(file.path.as_path());
      file.observe(modified);
    }

    let command = &mut self.commands[id.index()];
    remove_quietly(&self.fs, command.dep_path.as_path());
    command.state = CommandState::Ok;
    command.message = None;
    command.last_executed = None;
    info!(command = %command.dep_path, "cleaned command with no remaining inputs");
  }

  fn fail(&mut self, id: CommandId, message: String) {
    let command = &mut self.commands[id.index()];
    error!(command = %command.dep_path, %message, "command failed");
    command.state = CommandState::Error;
    command.message = Some(message);
  }

  /// Queue the command if it is dirty. Returns whether it is.
  fn evaluate(&mut self, id: CommandId) -> bool {
    if self.is_dirty(id) {
      self.enqueue(id);
      return true;
    }

    let command = &mut self.commands[id.index()];
    if command.state == CommandState::Dirty && !command.queued {
      command.state = CommandState::Ok;
    }
    false
  }

  fn enqueue(&mut self, id: CommandId) {
    let command = &mut self.commands[id.index()];
    command.state = CommandState::Dirty;
    if !command.queued {
      command.queued = true;
      self.queue.push(id);
    }
  }
}

fn remove_quietly(fs: &dyn FileSystem, path: &Path) {
  match fs.remove(path) {
    Ok(()) => {}
    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
    Err(err) => warn!(path = %path.display(), %err, "failed to remove file"),
  }
}

fn dedup_ids(ids: &mut Vec<FileId>) {
  let mut seen = HashSet::new();
  ids.retain(|id| seen.insert(*id));
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod graph_test;
