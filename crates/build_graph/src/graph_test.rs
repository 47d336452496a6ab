use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};

use super::*;
use crate::copy_rule::CopyRule;
use crate::fs::MemoryFileSystem;

const RAW: &str = "data/_raw/a.tex.png";
const DEP: &str = "data/_temp/a.tex.png.dep";
const BIN: &str = "data/_bin/a.tex.dds";

fn config() -> BuildConfig {
  BuildConfig::under("data")
}

fn texture_rule(version: i64) -> Box<dyn Rule> {
  Box::new(CopyRule::new("texture", "*.tex.*", version).with_output_extension("dds"))
}

fn write(fs: &MemoryFileSystem, path: &str, contents: &[u8]) {
  fs.write(Path::new(path), contents).unwrap();
}

fn graph_with(fs: MemoryFileSystem, rules: Vec<Box<dyn Rule>>) -> BuildGraph<MemoryFileSystem> {
  BuildGraph::new(config(), rules, fs).unwrap()
}

/// One raw texture, built once.
fn built_graph() -> BuildGraph<MemoryFileSystem> {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"pixels");
  let mut graph = graph_with(fs, vec![texture_rule(1)]);
  let report = graph.process_queue();
  assert_eq!(report.ok, 1);
  graph
}

fn only_command<F: FileSystem>(graph: &BuildGraph<F>) -> (CommandId, &Command) {
  let mut commands = graph.commands();
  let first = commands.next().expect("one command");
  assert!(commands.next().is_none(), "more than one command");
  first
}

/// Declares an extra input and produces nothing.
struct ExtraInputRule;

const PALETTE: &str = "data/_raw/shared/palette.act";

impl Rule for ExtraInputRule {
  fn name(&self) -> &str {
    "with-palette"
  }

  fn pattern(&self) -> &str {
    "*.tex.*"
  }

  fn version(&self) -> i64 {
    1
  }

  fn init(&self, _ctx: &RuleContext<'_>, jobs: &mut [Job]) {
    for job in jobs {
      job.add_input(PALETTE);
    }
  }

  fn execute(&self, _ctx: &RuleContext<'_>, jobs: &mut [Job]) {
    for job in jobs {
      job.succeed();
    }
  }
}

/// Fails every job, or leaves it untouched.
struct BrokenRule {
  resolve: bool,
}

impl Rule for BrokenRule {
  fn name(&self) -> &str {
    "broken"
  }

  fn pattern(&self) -> &str {
    "*"
  }

  fn version(&self) -> i64 {
    1
  }

  fn execute(&self, _ctx: &RuleContext<'_>, jobs: &mut [Job]) {
    if self.resolve {
      for job in jobs {
        job.fail("boom");
      }
    }
  }
}

#[test]
fn test_new_raw_file_gets_one_dirty_command() {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"pixels");
  write(&fs, "data/_raw/readme.txt", b"not a texture");
  let graph = graph_with(fs, vec![texture_rule(1)]);

  let (id, command) = only_command(&graph);
  let raw = graph.find_file_id(RAW).unwrap();

  assert_eq!(graph.queue(), &[id]);
  assert_eq!(command.state(), CommandState::Dirty);
  assert_eq!(command.inputs(), &[raw]);
  assert_eq!(command.provoking(), raw);
  assert_eq!(command.dep_path().as_str(), DEP);
  assert_eq!(graph.rule(command.rule()).name(), "texture");

  // Declared by the rule's init, not yet on disk
  let output = graph.file(command.outputs()[0]);
  assert_eq!(output.path().as_str(), BIN);
  assert!(output.is_missing());
}

#[test]
fn test_created_notification_creates_command() {
  let mut graph = graph_with(MemoryFileSystem::new(), vec![texture_rule(1)]);
  assert_eq!(graph.commands().count(), 0);

  write(graph.fs(), RAW, b"pixels");
  assert_eq!(graph.dispatch_notification(RAW, FileAction::Created), 1);

  let (id, command) = only_command(&graph);
  assert_eq!(graph.queue(), &[id]);
  assert_eq!(command.inputs(), &[graph.find_file_id(RAW).unwrap()]);
}

#[test]
fn test_process_queue_runs_rule_and_writes_record() {
  let graph = built_graph();
  let (id, command) = only_command(&graph);

  assert!(graph.queue().is_empty());
  assert!(!command.is_queued());
  assert_eq!(command.state(), CommandState::Ok);
  assert_eq!(command.last_executed(), Some(graph.fs().now()));
  assert_eq!(command.recorded_version(), 1);
  assert!(!graph.is_dirty(id));

  assert_eq!(graph.fs().read(Path::new(BIN)).unwrap(), b"pixels");
  let record = DepRecord::read(&graph.fs().read_to_string(Path::new(DEP)).unwrap()).unwrap();
  assert_eq!(record.rule, "texture");
  assert_eq!(record.version, 1);
  assert_eq!(record.timestamp, Some(graph.fs().now()));
  assert_eq!(record.inputs, vec![RAW.to_string()]);
  assert_eq!(record.outputs, vec![BIN.to_string()]);
}

#[test]
fn test_restart_with_fresh_record_queues_nothing() {
  let fs = built_graph().into_fs();
  let graph = graph_with(fs, vec![texture_rule(1)]);

  let (_, command) = only_command(&graph);
  assert!(graph.queue().is_empty());
  assert_eq!(command.state(), CommandState::Ok);
  assert_eq!(command.outputs().len(), 1);
  assert_eq!(graph.file(command.outputs()[0]).path().as_str(), BIN);
}

#[test]
fn test_rule_version_bump_requeues_on_restart() {
  let fs = built_graph().into_fs();
  let graph = graph_with(fs, vec![texture_rule(2)]);
  assert_eq!(graph.queue().len(), 1);
}

#[test]
fn test_modified_input_requeues() {
  let mut graph = built_graph();
  graph.fs().advance(TimeDelta::seconds(1));
  write(graph.fs(), RAW, b"new pixels");

  assert_eq!(graph.dispatch_notification(RAW, FileAction::Modified), 1);
  // A second event for the same change does not queue twice
  assert_eq!(graph.dispatch_notification(RAW, FileAction::Modified), 0);

  let report = graph.process_queue();
  assert_eq!(report.executed, 1);
  assert_eq!(graph.fs().read(Path::new(BIN)).unwrap(), b"new pixels");
}

#[test]
fn test_modified_input_requeues_when_mtime_moves_back() {
  let mut graph = built_graph();
  // A restore that keeps the archived timestamp
  write(graph.fs(), RAW, b"restored pixels");
  let restored = graph.fs().now() - TimeDelta::seconds(5);
  assert!(graph.fs().set_modified(RAW, restored));

  assert_eq!(graph.dispatch_notification(RAW, FileAction::Modified), 1);
  assert_eq!(graph.process_queue().executed, 1);
  assert_eq!(graph.fs().read(Path::new(BIN)).unwrap(), b"restored pixels");
}

#[test]
fn test_modified_input_requeues_within_same_tick() {
  let mut graph = built_graph();
  write(graph.fs(), RAW, b"same tick");
  let (id, _) = only_command(&graph);
  assert!(!graph.is_dirty(id), "timestamps alone cannot see this edit");

  assert_eq!(graph.dispatch_notification(RAW, FileAction::Modified), 1);
  assert_eq!(graph.queue(), &[id]);
  assert_eq!(graph.process_queue().ok, 1);
  assert_eq!(graph.fs().read(Path::new(BIN)).unwrap(), b"same tick");
}

#[test]
fn test_output_written_by_rule_does_not_requeue() {
  let mut graph = built_graph();
  assert_eq!(graph.dispatch_notification(BIN, FileAction::Modified), 0);
  assert_eq!(graph.dispatch_notification(DEP, FileAction::Modified), 0);
}

#[test]
fn test_deleted_output_requeues() {
  let mut graph = built_graph();
  graph.fs().remove(Path::new(BIN)).unwrap();

  assert_eq!(graph.dispatch_notification(BIN, FileAction::Deleted), 1);
  assert_eq!(graph.process_queue().ok, 1);
  assert!(graph.fs().exists(BIN));
}

#[test]
fn test_deleted_record_requeues() {
  let mut graph = built_graph();
  graph.fs().remove(Path::new(DEP)).unwrap();

  assert_eq!(graph.dispatch_notification(DEP, FileAction::Deleted), 1);
  graph.process_queue();
  assert!(graph.fs().exists(DEP));
  // Records are never tracked as files
  assert!(graph.find_file_by_path(DEP).is_none());
}

#[test]
fn test_all_inputs_missing_cleans_outputs() {
  let mut graph = built_graph();
  graph.fs().remove(Path::new(RAW)).unwrap();
  assert_eq!(graph.dispatch_notification(RAW, FileAction::Deleted), 1);

  let report = graph.process_queue();
  assert_eq!(
    report,
    BuildReport {
      cleaned: 1,
      ..BuildReport::default()
    }
  );

  let (_, command) = only_command(&graph);
  assert_eq!(command.state(), CommandState::Ok);
  assert!(command.outputs().is_empty());
  assert!(!graph.fs().exists(BIN));
  assert!(!graph.fs().exists(DEP));
  assert!(graph.find_file_by_path(BIN).unwrap().is_missing());
}

#[test]
fn test_recreated_input_after_clean_rebuilds() {
  let mut graph = built_graph();
  graph.fs().remove(Path::new(RAW)).unwrap();
  graph.dispatch_notification(RAW, FileAction::Deleted);
  graph.process_queue();

  graph.fs().advance(TimeDelta::seconds(1));
  write(graph.fs(), RAW, b"back");
  assert_eq!(graph.dispatch_notification(RAW, FileAction::Created), 1);
  assert_eq!(graph.process_queue().ok, 1);
  assert!(graph.fs().exists(BIN));
}

#[test]
fn test_record_without_raw_file_is_cleaned_on_startup() {
  let fs = built_graph().into_fs();
  fs.remove(Path::new(RAW)).unwrap();

  let mut graph = graph_with(fs, vec![texture_rule(1)]);
  assert_eq!(graph.queue().len(), 1);
  assert_eq!(graph.process_queue().cleaned, 1);
  assert!(!graph.fs().exists(BIN));
}

#[test]
fn test_some_inputs_missing_is_an_error() {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"pixels");
  let mut graph = graph_with(fs, vec![Box::new(ExtraInputRule)]);

  let (id, command) = only_command(&graph);
  assert_eq!(command.inputs().len(), 2);
  assert!(graph.find_file_by_path(PALETTE).unwrap().is_missing());

  let report = graph.process_queue();
  assert_eq!(report.errors, 1);
  assert_eq!(report.executed, 0);
  assert_eq!(graph.command(id).state(), CommandState::Error);
  assert_eq!(graph.command(id).message(), Some("input file is missing"));

  write(graph.fs(), PALETTE, b"colors");
  assert_eq!(graph.dispatch_notification(PALETTE, FileAction::Created), 1);
  assert_eq!(graph.process_queue().ok, 1);

  let record = DepRecord::read(&graph.fs().read_to_string(Path::new(DEP)).unwrap()).unwrap();
  assert_eq!(record.inputs, vec![RAW.to_string(), PALETTE.to_string()]);
}

#[test]
fn test_rule_failures_are_recorded_not_propagated() {
  for resolve in [true, false] {
    let fs = MemoryFileSystem::new();
    write(&fs, RAW, b"pixels");
    let mut graph = graph_with(fs, vec![Box::new(BrokenRule { resolve })]);

    let report = graph.process_queue();
    assert_eq!(report.executed, 1);
    assert_eq!(report.errors, 1);

    let (_, command) = only_command(&graph);
    assert_eq!(command.state(), CommandState::Error);
    assert!(command.message().is_some());
    assert!(!graph.fs().exists(DEP));
  }
}

#[test]
fn test_empty_source_is_a_warning() {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"");
  let mut graph = graph_with(fs, vec![texture_rule(1)]);

  let report = graph.process_queue();
  assert_eq!(report.warnings, 1);
  assert_eq!(only_command(&graph).1.state(), CommandState::Warning);
  assert!(graph.fs().exists(DEP));
}

#[test]
fn test_first_registered_rule_claims_the_file() {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"pixels");
  write(&fs, "data/_raw/b.png", b"pixels");
  let rules: Vec<Box<dyn Rule>> = vec![
    Box::new(CopyRule::new("png", "*.png", 1)),
    texture_rule(1),
  ];
  let mut graph = graph_with(fs, rules);

  assert_eq!(graph.commands().count(), 2);
  for (_, command) in graph.commands() {
    assert_eq!(graph.rule(command.rule()).name(), "png");
  }
  assert_eq!(graph.process_queue().ok, 2);
}

#[test]
fn test_rules_batch_independently() {
  let fs = MemoryFileSystem::new();
  write(&fs, RAW, b"pixels");
  write(&fs, "data/_raw/m.mesh.obj", b"verts");
  let rules: Vec<Box<dyn Rule>> = vec![texture_rule(1), Box::new(CopyRule::new("mesh", "*.mesh.*", 1))];
  let mut graph = graph_with(fs, rules);

  let report = graph.process_queue();
  assert_eq!(report.executed, 2);
  assert_eq!(report.ok, 2);
  assert!(graph.fs().exists("data/_bin/m.mesh.obj"));
}

#[test]
fn test_unusable_records_are_skipped() {
  for record in ["R mystery\nV 1\n", "V 1\n"] {
    let fs = MemoryFileSystem::new();
    write(&fs, RAW, b"pixels");
    write(&fs, DEP, record.as_bytes());
    let graph = graph_with(fs, vec![texture_rule(1)]);

    // The raw file still gets a command from the matching rule
    let (_, command) = only_command(&graph);
    assert_eq!(command.last_executed(), None);
    assert_eq!(graph.queue().len(), 1);
  }
}

/// Memory filesystem that logs which paths were listed or stat'ed.
struct LoggingFs {
  inner: MemoryFileSystem,
  log: std::sync::Mutex<Vec<String>>,
}

impl LoggingFs {
  fn new(inner: MemoryFileSystem) -> Self {
    Self {
      inner,
      log: std::sync::Mutex::new(Vec::new()),
    }
  }

  fn entries(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }
}

impl FileSystem for LoggingFs {
  fn list_files(&self, root: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    self.log.lock().unwrap().push(format!("list {}", root.display()));
    self.inner.list_files(root, pattern)
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    self.inner.read(path)
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    self.inner.write(path, contents)
  }

  fn remove(&self, path: &Path) -> io::Result<()> {
    self.inner.remove(path)
  }

  fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
    self.log.lock().unwrap().push(format!("stat {}", path.display()));
    self.inner.modified(path)
  }

  fn now(&self) -> DateTime<Utc> {
    self.inner.now()
  }
}

#[test]
fn test_record_scan_does_not_stat_files() {
  let fs = LoggingFs::new(built_graph().into_fs());
  let graph = BuildGraph::new(config(), vec![texture_rule(1)], fs).unwrap();

  let log = graph.fs().entries();
  let raw_listing = log
    .iter()
    .position(|entry| entry == "list data/_raw")
    .expect("raw root listed");
  assert_eq!(log[0], "list data/_temp");
  assert!(
    log[..raw_listing].iter().all(|entry| !entry.starts_with("stat")),
    "stat before the raw scan: {:?}",
    log
  );

  // State still comes from the root scans
  let (_, command) = only_command(&graph);
  assert!(graph.queue().is_empty());
  assert!(!graph.file(command.inputs()[0]).is_missing());
  assert!(!graph.file(command.outputs()[0]).is_missing());
}

#[test]
fn test_recorded_file_outside_roots_is_observed() {
  let fs = built_graph().into_fs();
  let record = DepRecord {
    rule: "texture".into(),
    version: 1,
    timestamp: Some(fs.now()),
    inputs: vec![RAW.into(), "shared/palette.act".into()],
    outputs: vec![BIN.into()],
  };
  write(&fs, DEP, record.write().as_bytes());
  write(&fs, "shared/palette.act", b"colors");
  let graph = graph_with(fs, vec![texture_rule(1)]);

  let palette = graph.find_file_by_path("shared/palette.act").unwrap();
  assert_eq!(palette.root(), None);
  assert!(!palette.is_missing());
  assert!(graph.queue().is_empty());
}

#[test]
fn test_duplicate_rule_names_are_rejected() {
  let result = BuildGraph::new(config(), vec![texture_rule(1), texture_rule(2)], MemoryFileSystem::new());
  assert!(matches!(result, Err(BuildError::DuplicateRule(name)) if name == "texture"));
}

#[test]
fn test_find_file_by_hash_and_path() {
  let graph = built_graph();
  let by_path = graph.find_file_by_path("data/_raw//a.tex.png").unwrap();
  let by_hash = graph.find_file(PathHash::of(RAW)).unwrap();

  assert_eq!(by_path.path(), by_hash.path());
  assert_eq!(by_path.root(), Some(RootKind::Raw));
  assert_eq!(by_path.commands_in().len(), 1);
  assert!(graph.find_file_by_path("data/_raw/other.png").is_none());
  assert_eq!(graph.find_command(DEP), Some(CommandId(0)));
}

#[test]
fn test_os_filesystem_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let config = BuildConfig::under(dir.path());
  let raw = config.raw.join("sub/a.tex.png");
  std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
  std::fs::write(&raw, b"pixels").unwrap();

  let mut graph = BuildGraph::new(config.clone(), vec![texture_rule(1)], OsFileSystem).unwrap();
  assert_eq!(graph.queue().len(), 1);
  assert_eq!(graph.process_queue().ok, 1);
  assert_eq!(std::fs::read(config.bin.join("sub/a.tex.dds")).unwrap(), b"pixels");
  assert!(config.temp.join("sub/a.tex.png.dep").exists());

  let graph = BuildGraph::new(config, vec![texture_rule(1)], OsFileSystem).unwrap();
  assert!(graph.queue().is_empty());
}
