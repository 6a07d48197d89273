use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

use junction_mover::{ExecutionMode, LogLevel, load_config_from_xml_path};

#[test]
fn reads_every_field() {
    let td = tempdir().unwrap();
    let path = td.path().join("config.xml");
    fs::write(
        &path,
        r#"<config>
  <target_root>/mnt/store</target_root>
  <scan_root>/home/me/.config</scan_root>
  <scan_limit> 12 </scan_limit>
  <mode>simulated</mode>
  <elevation_command>sudo -n</elevation_command>
  <log_level>info</log_level>
  <log_file>/tmp/jm.log</log_file>
  <verify_copy>true</verify_copy>
  <purge>false</purge>
  <compression>true</compression>
  <poll_interval_ms>250</poll_interval_ms>
  <space_margin_percent>25</space_margin_percent>
  <size_scan_timeout_seconds>30</size_scan_timeout_seconds>
</config>"#,
    )
    .unwrap();

    let cfg = load_config_from_xml_path(&path).unwrap();
    assert_eq!(cfg.target_root, Some(PathBuf::from("/mnt/store")));
    assert_eq!(cfg.scan_root, Some(PathBuf::from("/home/me/.config")));
    assert_eq!(cfg.scan_limit, 12);
    assert_eq!(cfg.mode, ExecutionMode::Simulated);
    assert_eq!(cfg.elevation_command, ["sudo", "-n"]);
    assert_eq!(cfg.log_level, LogLevel::Info);
    assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/jm.log")));
    assert!(cfg.verify_copy && !cfg.purge && cfg.compression);
    assert_eq!(cfg.poll_interval, Duration::from_millis(250));
    assert_eq!(cfg.space_margin_percent, 25);
    assert_eq!(cfg.size_scan_timeout, Some(Duration::from_secs(30)));

    let opts = cfg.relocate_options();
    assert!(opts.verify_after_copy && opts.compression && !opts.purge);
    assert_eq!(cfg.safety_checker().required_bytes(100), 125);
}

#[test]
fn empty_elements_keep_defaults() {
    let td = tempdir().unwrap();
    let path = td.path().join("config.xml");
    fs::write(&path, "<config><target_root></target_root><log_file>  </log_file></config>").unwrap();
    let cfg = load_config_from_xml_path(&path).unwrap();
    assert!(cfg.target_root.is_none());
    assert!(cfg.log_file.is_none());
    assert_eq!(cfg.mode, ExecutionMode::Native);
}

#[test]
fn bad_mode_is_an_error() {
    let td = tempdir().unwrap();
    let path = td.path().join("config.xml");
    fs::write(&path, "<config><mode>warp</mode></config>").unwrap();
    let err = load_config_from_xml_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("mode"));
}

#[test]
fn malformed_xml_is_an_error() {
    let td = tempdir().unwrap();
    let path = td.path().join("config.xml");
    fs::write(&path, "<config><target_root>/x</config>").unwrap();
    assert!(load_config_from_xml_path(&path).is_err());
}
