use std::path::{Path, PathBuf};

use chrono::TimeDelta;

use super::*;

#[test]
fn test_memory_write_is_stamped_with_clock() {
  let fs = MemoryFileSystem::new();
  let start = fs.now();

  fs.write(Path::new("_raw/a.txt"), b"one").unwrap();
  fs.advance(TimeDelta::seconds(5));
  fs.write(Path::new("_raw/b.txt"), b"two").unwrap();

  assert_eq!(fs.modified(Path::new("_raw/a.txt")), Some(start));
  assert_eq!(fs.modified(Path::new("_raw/b.txt")), Some(start + TimeDelta::seconds(5)));
  assert_eq!(fs.modified(Path::new("_raw/c.txt")), None);
  assert_eq!(fs.read_to_string(Path::new("_raw/b.txt")).unwrap(), "two");
}

#[test]
fn test_memory_list_is_sorted_and_filtered() {
  let fs = MemoryFileSystem::new();
  for path in ["_temp/b.dep", "_temp/sub/a.dep", "_temp/a.dep", "_temp/x.tmp", "_temporary/c.dep"] {
    fs.write(Path::new(path), b"").unwrap();
  }

  assert_eq!(
    fs.list_files(Path::new("_temp"), "*.dep").unwrap(),
    vec![
      PathBuf::from("_temp/a.dep"),
      PathBuf::from("_temp/b.dep"),
      PathBuf::from("_temp/sub/a.dep"),
    ]
  );
}

#[test]
fn test_memory_remove_missing_is_not_found() {
  let fs = MemoryFileSystem::new();
  let err = fs.remove(Path::new("nope")).unwrap_err();
  assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_memory_paths_are_normalized() {
  let fs = MemoryFileSystem::new();
  fs.write(Path::new("./_raw//a.txt"), b"x").unwrap();
  assert!(fs.exists("_raw/a.txt"));
  assert!(fs.set_modified("_raw/a.txt", DateTime::UNIX_EPOCH + TimeDelta::days(1)));
  assert_eq!(fs.file_count(), 1);
}

#[test]
fn test_os_round_trip() {
  let dir = tempfile::tempdir().unwrap();
  let fs = OsFileSystem;
  let path = dir.path().join("nested/deeper/file.txt");

  fs.write(&path, b"payload").unwrap();
  assert_eq!(fs.read_to_string(&path).unwrap(), "payload");
  assert!(fs.modified(&path).is_some());

  fs.remove(&path).unwrap();
  assert_eq!(fs.modified(&path), None);
}

#[test]
fn test_os_list_files_recurses_and_filters() {
  let dir = tempfile::tempdir().unwrap();
  let fs = OsFileSystem;
  fs.write(&dir.path().join("b.dep"), b"").unwrap();
  fs.write(&dir.path().join("sub/a.dep"), b"").unwrap();
  fs.write(&dir.path().join("sub/readme.md"), b"").unwrap();

  let listed = fs.list_files(dir.path(), "*.dep").unwrap();
  assert_eq!(listed, vec![dir.path().join("b.dep"), dir.path().join("sub/a.dep")]);
}

#[test]
fn test_os_missing_root_lists_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let listed = OsFileSystem.list_files(&dir.path().join("absent"), "*").unwrap();
  assert!(listed.is_empty());
}
