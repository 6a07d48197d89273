//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/log/scan paths and detects symlinked ancestors.

use anyhow::{Context, Result, anyhow};
use dirs::{config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{APP_DIR, CONFIG_ENV};

/// Config file path: `$JUNCTION_MOVER_CONFIG` if set (a directory gets
/// `config.xml` appended, relative paths resolve against the cwd), else the
/// platform config dir.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(raw) = env::var_os(CONFIG_ENV) {
        let mut p = PathBuf::from(raw);
        if p.is_relative() {
            p = env::current_dir()
                .context("resolve current directory")?
                .join(p);
        }
        if p.is_dir() {
            p.push("config.xml");
        }
        return Ok(p);
    }
    config_dir()
        .map(|base| base.join(APP_DIR).join("config.xml"))
        .ok_or_else(|| anyhow!("no platform config directory; set {CONFIG_ENV}"))
}

/// Log file path. Colocated with the config when `$JUNCTION_MOVER_CONFIG` is
/// set, otherwise under the platform data dir.
pub fn default_log_path() -> Result<PathBuf> {
    if env::var_os(CONFIG_ENV).is_some() {
        let cfg = default_config_path()?;
        let dir = cfg
            .parent()
            .ok_or_else(|| anyhow!("config path {} has no parent", cfg.display()))?;
        return Ok(dir.join("junction_mover.log"));
    }
    data_dir()
        .map(|base| base.join(APP_DIR).join("junction_mover.log"))
        .ok_or_else(|| anyhow!("no platform data directory; set a log_file explicitly"))
}

/// Where application state usually lives (Roaming AppData on Windows, `~/.config` elsewhere).
pub fn default_scan_root() -> Option<PathBuf> {
    config_dir()
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if anc.exists() {
            let meta = fs::symlink_metadata(anc)?;
            if meta.file_type().is_symlink() {
                return Ok(true);
            }
        }
        p = anc.parent();
    }
    Ok(false)
}
