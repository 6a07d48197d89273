use std::fs;
use tempfile::tempdir;

use junction_mover::{FixedVolume, NativeInspector, discover};

#[test]
fn measuring_fills_the_size_label() {
    let td = tempdir().unwrap();
    fs::create_dir(td.path().join("App")).unwrap();

    let mut folders = discover(td.path(), 10, &NativeInspector).unwrap();
    assert_eq!(folders.len(), 1);
    let volume = FixedVolume {
        tree_bytes: 3 * 1024 * 1024,
        ..Default::default()
    };
    let bytes = folders[0].measure(&volume, None).unwrap();
    assert_eq!(bytes, 3 * 1024 * 1024);
    assert_eq!(folders[0].size_label, "3.0 MiB");
}

#[test]
fn missing_root_is_an_error() {
    let td = tempdir().unwrap();
    assert!(discover(&td.path().join("gone"), 10, &NativeInspector).is_err());
}

#[cfg(unix)]
#[test]
fn relocated_folder_shows_its_target() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let root = base.join("root");
    let store = base.join("store/App");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&store).unwrap();
    std::os::unix::fs::symlink(&store, root.join("App")).unwrap();

    let folders = discover(&root, 10, &NativeInspector).unwrap();
    assert_eq!(folders.len(), 1);
    assert!(folders[0].is_junction);
    assert_eq!(folders[0].link_target.as_deref(), Some(store.as_path()));
}
