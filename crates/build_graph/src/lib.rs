//! Incremental asset build graph.
//!
//! Source files live under a *raw* root, intermediate data and dependency
//! records under a *temp* root, and final outputs under a *bin* root. Each
//! [`Rule`] claims raw files by glob; every claimed file gets a [`Command`]
//! whose dependency record remembers what it read, what it wrote and when.
//! Dirtiness is decided purely from file timestamps and rule versions.
//!
//! ```
//! use std::path::Path;
//! use build_graph::{BuildConfig, BuildGraph, CopyRule, FileSystem, MemoryFileSystem, Rule};
//!
//! let fs = MemoryFileSystem::new();
//! fs.write(Path::new("data/_raw/stone.tex.png"), b"pixels").unwrap();
//!
//! let rules: Vec<Box<dyn Rule>> = vec![Box::new(CopyRule::new("texture", "*.tex.*", 1))];
//! let mut graph = BuildGraph::new(BuildConfig::under("data"), rules, fs).unwrap();
//! assert_eq!(graph.queue().len(), 1);
//!
//! let report = graph.process_queue();
//! assert_eq!(report.ok, 1);
//! assert!(graph.fs().exists("data/_bin/stone.tex.png"));
//! ```

pub mod command;
pub mod config;
pub mod copy_rule;
pub mod depfile;
pub mod error;
pub mod file;
pub mod fs;
pub mod graph;
pub mod path;
pub mod pattern;
pub mod rule;

pub use command::{Command, CommandId, CommandState};
pub use config::BuildConfig;
pub use copy_rule::CopyRule;
pub use depfile::{DepRecord, DepRecordError};
pub use error::BuildError;
pub use file::{File, FileId, FileState};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use graph::{BuildGraph, BuildReport, FileAction};
pub use path::{AssetPath, PathHash, RootKind};
pub use pattern::matches_pattern;
pub use rule::{Job, Rule, RuleContext, RuleId};
