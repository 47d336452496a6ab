use std::path::PathBuf;

use crate::rule::{Job, Rule, RuleContext};

/// Copies the provoking file into the bin tree under the same relative
/// path, optionally swapping the final extension.
#[derive(Clone, Debug)]
pub struct CopyRule {
  name: String,
  pattern: String,
  version: i64,
  output_extension: Option<String>,
}

impl CopyRule {
  pub fn new(name: impl Into<String>, pattern: impl Into<String>, version: i64) -> Self {
    Self {
      name: name.into(),
      pattern: pattern.into(),
      version,
      output_extension: None,
    }
  }

  pub fn with_output_extension(mut self, extension: impl Into<String>) -> Self {
    self.output_extension = Some(extension.into());
    self
  }

  fn output_path(&self, ctx: &RuleContext<'_>, job: &Job) -> PathBuf {
    let path = ctx.config.bin.join(&job.relative);
    match &self.output_extension {
      Some(extension) => path.with_extension(extension),
      None => path,
    }
  }
}

impl Rule for CopyRule {
  fn name(&self) -> &str {
    &self.name
  }

  fn pattern(&self) -> &str {
    &self.pattern
  }

  fn version(&self) -> i64 {
    self.version
  }

  fn init(&self, ctx: &RuleContext<'_>, jobs: &mut [Job]) {
    for job in jobs {
      let output = self.output_path(ctx, job);
      job.add_output(output);
    }
  }

  fn execute(&self, ctx: &RuleContext<'_>, jobs: &mut [Job]) {
    for job in jobs {
      let output = self.output_path(ctx, job);
      let contents = match ctx.fs.read(&job.provoking) {
        Ok(contents) => contents,
        Err(err) => {
          job.fail(format!("cannot read {}: {err}", job.provoking.display()));
          continue;
        }
      };

      if let Err(err) = ctx.fs.write(&output, &contents) {
        job.fail(format!("cannot write {}: {err}", output.display()));
        continue;
      }

      job.outputs = vec![output];
      if contents.is_empty() {
        job.warn("source file is empty");
      } else {
        job.succeed();
      }
    }
  }
}
