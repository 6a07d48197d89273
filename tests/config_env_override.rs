use serial_test::serial;
use std::fs;
use tempfile::tempdir;

use junction_mover::config::{CONFIG_ENV, LoadResult, load_or_init};
use junction_mover::{default_config_path, default_log_path};

#[test]
#[serial]
fn env_file_is_used_and_log_colocates() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let cfg = base.join("custom_config.xml");
    fs::write(&cfg, "<config><mode>direct</mode></config>").unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, &cfg);
    }

    assert_eq!(default_config_path().unwrap(), cfg);
    assert_eq!(default_log_path().unwrap().parent(), cfg.parent());
    match load_or_init().unwrap() {
        LoadResult::Loaded { config, path } => {
            assert_eq!(path, cfg);
            assert_eq!(config.mode, junction_mover::ExecutionMode::Direct);
        }
        other => panic!("expected Loaded, got {other:?}"),
    }

    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
#[serial]
fn env_directory_gets_config_xml_appended() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, &base);
    }
    assert_eq!(default_config_path().unwrap(), base.join("config.xml"));
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    let td = tempdir().unwrap();
    let missing = fs::canonicalize(td.path()).unwrap().join("nope.xml");

    unsafe {
        std::env::set_var(CONFIG_ENV, &missing);
    }
    assert!(load_or_init().is_err());
    assert!(!missing.exists(), "no template for an explicit path");
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}
