//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.
//! - ExecutionMode picks how the privileged script is run.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::paths;
use super::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SIZE_SCAN_TIMEOUT_SECS};
use crate::discovery::DEFAULT_SCAN_LIMIT;
use crate::model::RelocateOptions;
use crate::safety::{DEFAULT_SPACE_MARGIN_PERCENT, SafetyChecker};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    #[default]
    Normal,
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// How the privileged script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Platform shell under elevation (PowerShell/UAC, or sh behind a prefix).
    #[default]
    Native,
    /// Interpret the plan in-process with current privileges.
    Direct,
    /// Walk through the plan without touching the disk.
    Simulated,
}

impl ExecutionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "elevated" => Some(ExecutionMode::Native),
            "direct" | "in-process" | "inprocess" => Some(ExecutionMode::Direct),
            "simulated" | "simulation" | "demo" => Some(ExecutionMode::Simulated),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Native => "native",
            ExecutionMode::Direct => "direct",
            ExecutionMode::Simulated => "simulated",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid mode: '{s}' (expected native, direct or simulated)"))
    }
}

/// Elevation prefix used by the Unix shell bridge when none is configured.
pub fn default_elevation_command() -> Vec<String> {
    if cfg!(windows) {
        Vec::new()
    } else {
        vec!["pkexec".to_string()]
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Volume/prefix that relocated folders land under.
    pub target_root: Option<PathBuf>,
    /// Directory whose children `scan` lists.
    pub scan_root: Option<PathBuf>,
    pub scan_limit: usize,
    pub mode: ExecutionMode,
    /// Unix elevation prefix, e.g. `pkexec` or `sudo -n`.
    pub elevation_command: Vec<String>,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
    pub verify_copy: bool,
    pub purge: bool,
    pub compression: bool,
    pub poll_interval: Duration,
    pub space_margin_percent: u32,
    /// Cap on measuring the source tree; `None` waits indefinitely.
    pub size_scan_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_root: None,
            scan_root: paths::default_scan_root(),
            scan_limit: DEFAULT_SCAN_LIMIT,
            mode: ExecutionMode::Native,
            elevation_command: default_elevation_command(),
            log_level: LogLevel::Normal,
            log_file: None,
            verify_copy: false,
            purge: false,
            compression: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            space_margin_percent: DEFAULT_SPACE_MARGIN_PERCENT,
            size_scan_timeout: Some(Duration::from_secs(DEFAULT_SIZE_SCAN_TIMEOUT_SECS)),
        }
    }
}

impl Config {
    pub fn relocate_options(&self) -> RelocateOptions {
        RelocateOptions {
            verify_after_copy: self.verify_copy,
            purge: self.purge,
            compression: self.compression,
        }
    }

    pub fn safety_checker(&self) -> SafetyChecker {
        SafetyChecker {
            margin_percent: self.space_margin_percent,
            size_scan_limit: self.size_scan_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_accepts_aliases() {
        assert_eq!(ExecutionMode::parse("Demo"), Some(ExecutionMode::Simulated));
        assert_eq!(ExecutionMode::parse(" direct "), Some(ExecutionMode::Direct));
        assert!("bogus".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.space_margin_percent, 10);
        assert_eq!(cfg.scan_limit, 50);
        assert_eq!(cfg.safety_checker().required_bytes(100), 110);
    }
}
