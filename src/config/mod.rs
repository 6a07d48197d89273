//! Configuration: types, default paths, XML loading and validation.
//!
//! Precedence is defaults < XML file < CLI flags; the CLI layer applies the
//! last step.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{
    default_config_path, default_log_path, default_scan_root, path_has_symlink_ancestor,
};
pub use types::{Config, ExecutionMode, LogLevel};
pub use xml::{LoadResult, create_template_config, load_config_from_xml_path, load_or_init};

/// Environment variable naming an explicit config file (or a directory holding `config.xml`).
pub const CONFIG_ENV: &str = "JUNCTION_MOVER_CONFIG";

/// Directory name used under the platform config and data dirs.
pub const APP_DIR: &str = "junction_mover";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SIZE_SCAN_TIMEOUT_SECS: u64 = 120;
