//! Dependency record codec.
//!
//! One line per fact, a single-letter prefix and one space:
//!
//! ```text
//! R <rule name>
//! V <rule version>
//! T <last executed, RFC 3339 with nanoseconds, or ->
//! I <input path>        (repeated)
//! O <output path>       (repeated)
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse failure with a 1-based line number (0 for whole-record problems).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct DepRecordError {
  pub line: usize,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRecord {
  pub rule: String,
  /// -1 when the record carries no usable version.
  pub version: i64,
  pub timestamp: Option<DateTime<Utc>>,
  pub inputs: Vec<String>,
  pub outputs: Vec<String>,
}

impl DepRecord {
  /// Parse a record. Unknown prefixes and malformed `V`/`T` values are
  /// tolerated; only a missing or repeated rule line is an error.
  pub fn read(text: &str) -> Result<Self, DepRecordError> {
    let mut rule: Option<String> = None;
    let mut version = -1;
    let mut timestamp = None;
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for (index, line) in text.lines().enumerate() {
      let line = line.trim_end_matches('\r');
      let Some((prefix, value)) = line.split_once(' ') else {
        continue;
      };

      match prefix {
        "R" => {
          if rule.is_some() {
            return Err(DepRecordError {
              line: index + 1,
              reason: "repeated rule line".into(),
            });
          }
          rule = Some(value.to_owned());
        }
        "V" => version = value.trim().parse().unwrap_or(-1),
        "T" => {
          timestamp = DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc));
        }
        "I" if !value.is_empty() => inputs.push(value.to_owned()),
        "O" if !value.is_empty() => outputs.push(value.to_owned()),
        _ => {}
      }
    }

    let rule = rule.filter(|r| !r.is_empty()).ok_or(DepRecordError {
      line: 0,
      reason: "missing rule line".into(),
    })?;

    Ok(Self {
      rule,
      version,
      timestamp,
      inputs,
      outputs,
    })
  }

  /// Serialize; always emits the rule, version and timestamp lines.
  pub fn write(&self) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "R {}", self.rule);
    let _ = writeln!(out, "V {}", self.version);
    match self.timestamp {
      Some(t) => {
        let _ = writeln!(out, "T {}", t.to_rfc3339_opts(SecondsFormat::Nanos, true));
      }
      None => out.push_str("T -\n"),
    }
    for input in &self.inputs {
      let _ = writeln!(out, "I {input}");
    }
    for output in &self.outputs {
      let _ = writeln!(out, "O {output}");
    }
    out
  }
}

#[cfg(test)]
#[path = "depfile_test.rs"]
mod depfile_test;
