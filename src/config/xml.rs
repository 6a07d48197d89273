//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Creates a commented template at the default location on first run.
//!
//! Unknown elements are rejected (`deny_unknown_fields`) so typos surface as
//! errors instead of silently falling back to defaults.

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::paths::{default_config_path, default_log_path, default_scan_root, path_has_symlink_ancestor};
use super::types::{Config, ExecutionMode, LogLevel};
use super::{CONFIG_ENV, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SIZE_SCAN_TIMEOUT_SECS};
use crate::discovery::DEFAULT_SCAN_LIMIT;
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};
use crate::safety::DEFAULT_SPACE_MARGIN_PERCENT;

/// Mirrors the XML document for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    target_root: Option<String>,
    scan_root: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    scan_limit: Option<u64>,
    mode: Option<String>,
    elevation_command: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    verify_copy: Option<bool>,
    purge: Option<bool>,
    compression: Option<bool>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    poll_interval_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    space_margin_percent: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    size_scan_timeout_seconds: Option<u64>,
}

// Trims surrounding whitespace; an unparsable number is treated as absent.
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

/// Outcome of locating and reading the config file.
#[derive(Debug)]
pub enum LoadResult {
    Loaded { config: Config, path: PathBuf },
    /// No file existed at the default location; a template was written there.
    CreatedTemplate(PathBuf),
    /// No file and no template (creation refused or failed); defaults apply.
    Defaults,
}

fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(s) = non_empty(parsed.target_root.as_deref()) {
        cfg.target_root = Some(PathBuf::from(s));
    }
    if let Some(s) = non_empty(parsed.scan_root.as_deref()) {
        cfg.scan_root = Some(PathBuf::from(s));
    }
    if let Some(n) = parsed.scan_limit {
        cfg.scan_limit = n as usize;
    }
    if let Some(s) = non_empty(parsed.mode.as_deref()) {
        cfg.mode = ExecutionMode::parse(s)
            .with_context(|| format!("invalid <mode> '{s}' (expected native, direct or simulated)"))?;
    }
    if let Some(s) = parsed.elevation_command.as_deref() {
        cfg.elevation_command = s.split_whitespace().map(str::to_string).collect();
    }
    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        cfg.log_level = s
            .parse::<LogLevel>()
            .map_err(anyhow::Error::msg)
            .context("invalid <log_level>")?;
    }
    if let Some(s) = non_empty(parsed.log_file.as_deref()) {
        cfg.log_file = Some(PathBuf::from(s));
    }
    cfg.verify_copy = parsed.verify_copy.unwrap_or(false);
    cfg.purge = parsed.purge.unwrap_or(false);
    cfg.compression = parsed.compression.unwrap_or(false);
    if let Some(ms) = parsed.poll_interval_ms {
        cfg.poll_interval = Duration::from_millis(ms);
    }
    if let Some(pct) = parsed.space_margin_percent {
        cfg.space_margin_percent = u32::try_from(pct).unwrap_or(u32::MAX);
    }
    if let Some(secs) = parsed.size_scan_timeout_seconds {
        cfg.size_scan_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    Ok(cfg)
}

/// Load a Config from a specific XML file.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    let cfg = xml_to_config(parsed).with_context(|| format!("config xml '{}'", path.display()))?;
    debug!(path = %path.display(), mode = %cfg.mode, "loaded config");
    Ok(cfg)
}

/// Locate the config file and load it, writing a template at the default
/// location when none exists. An explicit `$JUNCTION_MOVER_CONFIG` that does
/// not exist is an error.
pub fn load_or_init() -> Result<LoadResult> {
    let path = default_config_path()?;
    if path.exists() {
        let config = load_config_from_xml_path(&path)?;
        return Ok(LoadResult::Loaded { config, path });
    }
    if env::var_os(CONFIG_ENV).is_some() {
        bail!(
            "{CONFIG_ENV} points at {}, which does not exist",
            path.display()
        );
    }
    match create_template_config(&path) {
        Ok(()) => Ok(LoadResult::CreatedTemplate(path)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "template config not created");
            Ok(LoadResult::Defaults)
        }
    }
}

/// Write a commented template config with conservative permissions.
/// Refuses when an ancestor of `path` is a symlink.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config directory '{}'", parent.display()))?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let scan_root = default_scan_root()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let elevation = super::types::default_elevation_command().join(" ");

    let content = format!(
        r#"<!--
  junction_mover configuration (XML)

  Paths:
    target_root                -> volume/prefix relocated folders are moved under
    scan_root                  -> directory whose child folders `scan` lists
    log_file                   -> optional log file (refused if an ancestor is a symlink)

  Behaviour:
    mode                       -> native | direct | simulated
    elevation_command          -> Unix only: prefix for the privileged shell (pkexec, sudo -n, doas)
    verify_copy                -> verify each transferred file (true/false)
    purge                      -> delete destination entries missing from the source (true/false)
    compression                -> NTFS-compress the destination after copying (true/false)
    scan_limit                 -> maximum folders listed by `scan`
    poll_interval_ms           -> progress polling interval
    space_margin_percent       -> free space required beyond the source size
    size_scan_timeout_seconds  -> cap on measuring the source tree (0 = no cap)
    log_level                  -> quiet | normal | info | debug

  CLI flags override values in this file.
-->
<config>
  <target_root></target_root>
  <scan_root>{scan_root}</scan_root>
  <mode>native</mode>
  <elevation_command>{elevation}</elevation_command>
  <log_level>normal</log_level>
  <log_file>{suggested_log}</log_file>
  <verify_copy>false</verify_copy>
  <purge>false</purge>
  <compression>false</compression>
  <scan_limit>{DEFAULT_SCAN_LIMIT}</scan_limit>
  <poll_interval_ms>{DEFAULT_POLL_INTERVAL_MS}</poll_interval_ms>
  <space_margin_percent>{DEFAULT_SPACE_MARGIN_PERCENT}</space_margin_percent>
  <size_scan_timeout_seconds>{DEFAULT_SIZE_SCAN_TIMEOUT_SECS}</size_scan_timeout_seconds>
</config>
"#
    );

    // Atomic, no-follow write, then tighten perms.
    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn template_round_trips_through_loader() {
        let td = tempdir().unwrap();
        let base = fs::canonicalize(td.path()).unwrap();
        let path = base.join("cfg").join("config.xml");
        create_template_config(&path).unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.mode, ExecutionMode::Native);
        assert!(cfg.target_root.is_none());
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.size_scan_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn zero_scan_timeout_means_unbounded() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.xml");
        fs::write(
            &path,
            "<config><size_scan_timeout_seconds> 0 </size_scan_timeout_seconds></config>",
        )
        .unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.size_scan_timeout, None);
    }

    #[test]
    fn unknown_element_is_rejected() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.xml");
        fs::write(&path, "<config><download_base>/x</download_base></config>").unwrap();
        assert!(load_config_from_xml_path(&path).is_err());
    }
}
