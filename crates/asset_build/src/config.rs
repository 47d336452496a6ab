//! Configuration parsing for the asset build driver.

use anyhow::{Context, Result};
use build_graph::{BuildConfig, CopyRule, Rule};
use serde::Deserialize;
use std::path::Path;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
	/// Raw, temp and bin roots, relative to the assets directory.
	pub roots: BuildConfig,
	/// Copy rules, in priority order.
	#[serde(default)]
	pub rules: Vec<RuleConfig>,
}

/// A single copy rule.
#[derive(Debug, Deserialize)]
pub struct RuleConfig {
	/// Unique name, stored in dependency records.
	pub name: String,
	/// Glob matched against raw file names.
	pub pattern: String,
	/// Bump to rebuild everything this rule produced.
	#[serde(default)]
	pub version: i64,
	/// Replace the final extension of the copied file.
	pub output_extension: Option<String>,
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		Self::from_toml(&content)
	}

	pub fn from_toml(content: &str) -> Result<Self> {
		let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;

		if config.rules.is_empty() {
			anyhow::bail!("Config must have at least one rule");
		}
		if let Some(rule) = config.rules.iter().find(|r| r.pattern.is_empty()) {
			anyhow::bail!("Rule `{}` has an empty pattern", rule.name);
		}

		Ok(config)
	}

	/// Roots resolved against `assets_dir`.
	pub fn build_config(&self, assets_dir: &Path) -> BuildConfig {
		BuildConfig {
			raw: assets_dir.join(&self.roots.raw),
			temp: assets_dir.join(&self.roots.temp),
			bin: assets_dir.join(&self.roots.bin),
			dep_extension: self.roots.dep_extension.clone(),
		}
	}

	pub fn rules(&self) -> Vec<Box<dyn Rule>> {
		self.rules
			.iter()
			.map(|r| {
				let rule = CopyRule::new(&r.name, &r.pattern, r.version);
				let rule = match &r.output_extension {
					Some(ext) => rule.with_output_extension(ext),
					None => rule,
				};
				Box::new(rule) as Box<dyn Rule>
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
[roots]
raw = "_raw"
temp = "_temp"
bin = "_bin"

[[rules]]
name = "texture"
pattern = "*.tex.*"
version = 2
output_extension = "dds"

[[rules]]
name = "mesh"
pattern = "*.mesh.*"
"#;

	#[test]
	fn test_parse_sample() {
		let config = Config::from_toml(SAMPLE).unwrap();

		assert_eq!(config.roots.dep_extension, "dep");
		assert_eq!(config.rules.len(), 2);
		assert_eq!(config.rules[0].version, 2);
		assert_eq!(config.rules[1].version, 0);
		assert_eq!(config.rules[1].output_extension, None);

		let rules = config.rules();
		assert_eq!(rules[0].name(), "texture");
		assert!(rules[0].matches("a.tex.png"));
		assert!(rules[1].matches("m.mesh.obj"));
	}

	#[test]
	fn test_roots_are_resolved_against_assets_dir() {
		let config = Config::from_toml(SAMPLE).unwrap();
		let build = config.build_config(Path::new("assets"));
		assert_eq!(build.raw, Path::new("assets/_raw"));
		assert_eq!(build.bin, Path::new("assets/_bin"));
	}

	#[test]
	fn test_rejects_config_without_rules() {
		let err = Config::from_toml("[roots]\nraw = \"r\"\ntemp = \"t\"\nbin = \"b\"\n").unwrap_err();
		assert!(err.to_string().contains("at least one rule"));
	}
}
