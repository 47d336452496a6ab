use chrono::{DateTime, Utc};

use super::*;

fn sample() -> DepRecord {
  DepRecord {
    rule: "texture".into(),
    version: 3,
    timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789),
    inputs: vec!["_raw/a.tex.png".into(), "_raw/shared/palette.act".into()],
    outputs: vec!["_bin/a.tex.dds".into()],
  }
}

#[test]
fn test_write_format() {
  assert_eq!(
    sample().write(),
    "R texture\n\
     V 3\n\
     T 2023-11-14T22:13:20.123456789Z\n\
     I _raw/a.tex.png\n\
     I _raw/shared/palette.act\n\
     O _bin/a.tex.dds\n"
  );
}

#[test]
fn test_round_trip_preserves_everything() {
  let record = sample();
  assert_eq!(DepRecord::read(&record.write()), Ok(record));
}

#[test]
fn test_missing_version_reads_as_minus_one() {
  let record = DepRecord::read("R texture\nI _raw/a.tex.png\n").unwrap();
  assert_eq!(record.version, -1);
  assert_eq!(record.timestamp, None);
  assert_eq!(record.inputs, vec!["_raw/a.tex.png".to_string()]);
}

#[test]
fn test_garbage_values_are_tolerated() {
  let record = DepRecord::read("R mesh\nV seven\nT yesterday\nX unknown\nO _bin/m.bin\n\n").unwrap();
  assert_eq!(record.rule, "mesh");
  assert_eq!(record.version, -1);
  assert_eq!(record.timestamp, None);
  assert!(record.inputs.is_empty());
  assert_eq!(record.outputs, vec!["_bin/m.bin".to_string()]);
}

#[test]
fn test_unset_timestamp_round_trips() {
  let record = DepRecord {
    timestamp: None,
    ..sample()
  };
  assert!(record.write().contains("T -\n"));
  assert_eq!(DepRecord::read(&record.write()).unwrap().timestamp, None);
}

#[test]
fn test_paths_with_spaces() {
  let record = DepRecord::read("R copy\nI _raw/my file.txt\n").unwrap();
  assert_eq!(record.inputs, vec!["_raw/my file.txt".to_string()]);
}

#[test]
fn test_missing_rule_is_an_error() {
  assert_eq!(
    DepRecord::read("V 1\n"),
    Err(DepRecordError {
      line: 0,
      reason: "missing rule line".into()
    })
  );
}

#[test]
fn test_repeated_rule_is_an_error() {
  let err = DepRecord::read("R a\nV 1\nR b\n").unwrap_err();
  assert_eq!(err.line, 3);
}
