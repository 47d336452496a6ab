//! Incremental asset builder.
//!
//! Scans the raw, temp and bin roots named in the config, reports which
//! commands are dirty, and with `--execute` runs them.

mod config;

use anyhow::{Context, Result};
use build_graph::{BuildGraph, CommandState, OsFileSystem};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use config::Config;

/// Incremental asset builder.
#[derive(Parser, Debug)]
#[command(name = "asset_build")]
#[command(about = "Rebuilds assets whose sources or rules changed")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: PathBuf,

	/// Assets directory (default: inferred from config path).
	#[arg(short, long)]
	assets_dir: Option<PathBuf>,

	/// Run the dirty commands instead of only listing them.
	#[arg(short, long)]
	execute: bool,

	/// Enable debug logging.
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> Result<()> {
	let args = Args::parse();

	let default_level = if args.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
		)
		.init();

	let assets_dir = args.assets_dir.unwrap_or_else(|| {
		args.config
			.parent()
			.unwrap_or(Path::new("."))
			.to_path_buf()
	});

	let config = Config::load(&args.config)?;
	let build_config = config.build_config(&assets_dir);
	tracing::info!(
		config = %args.config.display(),
		assets = %assets_dir.display(),
		rules = config.rules.len(),
		"loaded configuration"
	);

	let mut graph = BuildGraph::new(build_config, config.rules(), OsFileSystem)
		.context("Failed to scan asset roots")?;

	println!("{} dirty command(s)", graph.queue().len());
	for &id in graph.queue() {
		let command = graph.command(id);
		println!(
			"  [{}] {}",
			graph.rule(command.rule()).name(),
			graph.file(command.provoking()).path()
		);
	}

	if !args.execute {
		return Ok(());
	}

	let report = graph.process_queue();
	for (_, command) in graph.commands() {
		if let (CommandState::Error | CommandState::Warning, Some(message)) =
			(command.state(), command.message())
		{
			println!(
				"  {:?} {}: {}",
				command.state(),
				graph.file(command.provoking()).path(),
				message
			);
		}
	}
	println!(
		"\nExecuted {}: {} ok, {} warnings, {} errors, {} cleaned",
		report.executed, report.ok, report.warnings, report.errors, report.cleaned
	);

	if report.errors > 0 {
		anyhow::bail!("{} command(s) failed", report.errors);
	}
	Ok(())
}
