use clap::Parser;
use std::path::PathBuf;

use junction_mover::cli::{Args, Command};
use junction_mover::{Config, ExecutionMode, LogLevel};

#[test]
fn debug_flag_wins_over_log_level() {
    let args = Args::parse_from(["junction_mover", "--log-level", "quiet", "-d", "scan"]);
    assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
}

#[test]
fn relocate_flags_override_config() {
    let args = Args::parse_from([
        "junction_mover",
        "--mode",
        "direct",
        "relocate",
        "/data/App/",
        "--target",
        "\"/mnt/store\"",
        "--verify",
        "--purge",
        "-y",
    ]);
    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);

    assert_eq!(cfg.mode, ExecutionMode::Direct);
    assert_eq!(cfg.target_root, Some(PathBuf::from("/mnt/store")));
    assert!(cfg.verify_copy);
    assert!(cfg.purge);
    assert!(!cfg.compression);
    match args.command {
        Some(Command::Relocate { yes, .. }) => assert!(yes),
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn scan_root_and_limit_override_config() {
    let args = Args::parse_from(["junction_mover", "scan", "/srv/apps", "--limit", "5"]);
    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.scan_root, Some(PathBuf::from("/srv/apps")));
    assert_eq!(cfg.scan_limit, 5);
}

#[test]
fn unset_flags_leave_config_alone() {
    let args = Args::parse_from(["junction_mover", "inspect", "/data/App"]);
    let mut cfg = Config {
        verify_copy: true,
        log_level: LogLevel::Info,
        ..Default::default()
    };
    args.apply_overrides(&mut cfg);
    assert!(cfg.verify_copy);
    assert_eq!(cfg.log_level, LogLevel::Info);
    assert_eq!(cfg.mode, ExecutionMode::Native);
}

#[test]
fn negated_copy_flags_turn_config_defaults_off() {
    let args = Args::parse_from([
        "junction_mover",
        "relocate",
        "/data/App",
        "--no-purge",
        "--no-verify",
    ]);
    let mut cfg = Config {
        purge: true,
        verify_copy: true,
        compression: true,
        ..Default::default()
    };
    args.apply_overrides(&mut cfg);
    assert!(!cfg.purge);
    assert!(!cfg.verify_copy);
    assert!(cfg.compression, "untouched flags keep the config value");
}

#[test]
fn last_of_paired_copy_flags_wins() {
    let args = Args::parse_from(["junction_mover", "plan", "/data/App", "--purge", "--no-purge"]);
    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);
    assert!(!cfg.purge);

    let args = Args::parse_from(["junction_mover", "plan", "/data/App", "--no-purge", "--purge"]);
    args.apply_overrides(&mut cfg);
    assert!(cfg.purge);
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(Args::try_parse_from(["junction_mover", "--mode", "turbo", "scan"]).is_err());
}
