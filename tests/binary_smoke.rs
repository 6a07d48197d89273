use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &Path, target_root: &Path) -> std::path::PathBuf {
    let cfg = dir.join("config.xml");
    fs::write(
        &cfg,
        format!(
            "<config>\n  <target_root>{}</target_root>\n  <mode>direct</mode>\n  <poll_interval_ms>20</poll_interval_ms>\n</config>\n",
            target_root.display()
        ),
    )
    .unwrap();
    cfg
}

#[test]
fn binary_print_config_succeeds() {
    let me = assert_cmd::cargo::cargo_bin!("junction_mover");
    let out = Command::new(me)
        .arg("--print-config")
        .output()
        .expect("spawn binary");
    assert!(out.status.success(), "binary should succeed with --print-config");
}

#[test]
fn scan_lists_folders_as_json() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let root = base.join("apps");
    fs::create_dir_all(root.join("Beta")).unwrap();
    fs::create_dir_all(root.join("alpha")).unwrap();
    let cfg = write_config(&base, &base.join("store"));

    let me = assert_cmd::cargo::cargo_bin!("junction_mover");
    let out = Command::new(me)
        .env("JUNCTION_MOVER_CONFIG", &cfg)
        .args(["--json", "scan"])
        .arg(&root)
        .output()
        .expect("spawn binary");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let listed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let names: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["alpha", "Beta"]);
    assert_eq!(listed[0]["isJunction"], false);
}

#[test]
fn plan_prints_commands_without_moving() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let source = base.join("App");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a.txt"), b"a").unwrap();
    let store = base.join("store");
    let cfg = write_config(&base, &store);

    let me = assert_cmd::cargo::cargo_bin!("junction_mover");
    let out = Command::new(me)
        .env("JUNCTION_MOVER_CONFIG", &cfg)
        .arg("plan")
        .arg(&source)
        .output()
        .expect("spawn binary");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("mklink /J"));
    assert!(stdout.contains("::step::"));
    assert!(source.join("a.txt").exists());
    assert!(!store.exists());
}

#[test]
fn restore_of_plain_directory_exits_with_error_code() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let source = base.join("App");
    fs::create_dir_all(&source).unwrap();
    let cfg = write_config(&base, &base.join("store"));

    let me = assert_cmd::cargo::cargo_bin!("junction_mover");
    let out = Command::new(me)
        .env("JUNCTION_MOVER_CONFIG", &cfg)
        .args(["restore", "--yes"])
        .arg(&source)
        .output()
        .expect("spawn binary");
    assert_eq!(out.status.code(), Some(12));
    assert!(source.is_dir());
}

#[cfg(unix)]
#[test]
fn direct_relocate_leaves_a_link() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let source = base.join("App");
    fs::create_dir_all(source.join("sub")).unwrap();
    fs::write(source.join("sub/a.txt"), b"hello").unwrap();
    let store = base.join("store");
    let cfg = write_config(&base, &store);

    let me = assert_cmd::cargo::cargo_bin!("junction_mover");
    let out = Command::new(me)
        .env("JUNCTION_MOVER_CONFIG", &cfg)
        .args(["relocate", "--yes"])
        .arg(&source)
        .output()
        .expect("spawn binary");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(fs::symlink_metadata(&source).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(store.join("App/sub/a.txt")).unwrap(), b"hello");
}
