use assert_fs::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use junction_mover::bridge::bulk_move;

#[test]
fn moves_nested_tree_and_reports_each_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let src = temp.child("App");
    src.child("one.txt").write_str("one").unwrap();
    src.child("sub/two.txt").write_str("two!").unwrap();
    src.child("sub/empty").create_dir_all().unwrap();
    let dst = temp.child("store/App");

    let seen = Mutex::new(Vec::<(PathBuf, u64)>::new());
    let on_file = |p: &std::path::Path, len: u64| seen.lock().unwrap().push((p.to_path_buf(), len));
    let report = bulk_move(src.path(), dst.path(), true, false, &on_file).unwrap();

    assert_eq!(report.files, 2);
    assert_eq!(report.bytes, 7);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(fs::read_to_string(dst.child("sub/two.txt").path()).unwrap(), "two!");
    assert!(dst.child("sub/empty").path().is_dir());
    // Source root stays, emptied.
    assert!(src.path().is_dir());
    assert_eq!(fs::read_dir(src.path()).unwrap().count(), 0);
}

#[test]
fn missing_source_is_an_error() {
    let temp = assert_fs::TempDir::new().unwrap();
    let err = bulk_move(
        temp.child("missing").path(),
        temp.child("dst").path(),
        false,
        false,
        &|_, _| {},
    )
    .unwrap_err();
    assert!(err.to_string().contains("not a directory"));
}

#[test]
fn existing_destination_files_are_overwritten() {
    let temp = assert_fs::TempDir::new().unwrap();
    let src = temp.child("App");
    src.child("cfg.ini").write_str("new").unwrap();
    let dst = temp.child("store");
    dst.child("cfg.ini").write_str("old-and-longer").unwrap();

    bulk_move(src.path(), dst.path(), false, false, &|_, _| {}).unwrap();
    assert_eq!(fs::read_to_string(dst.child("cfg.ini").path()).unwrap(), "new");
}
