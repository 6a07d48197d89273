//! Config validation logic.
//! Checks numeric ranges and that the configured roots are usable directories.

use anyhow::{Result, bail};
use std::path::Path;
use tracing::{debug, error, info};

use super::types::Config;

impl Config {
    /// Validate settings before any job runs. Per-job destination checks
    /// (inside the source, non-empty) happen in the engine.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.space_margin_percent > 100 {
            bail!(
                "space_margin_percent must be between 0 and 100 (got {})",
                self.space_margin_percent
            );
        }
        if self.scan_limit == 0 {
            bail!("scan_limit must be greater than zero");
        }

        if let Some(root) = &self.target_root {
            ensure_absolute(root, "target_root")?;
            if root.exists() && !root.is_dir() {
                error!("target_root exists but isn't a directory: {}", root.display());
                bail!("target_root exists but isn't a directory: {}", root.display());
            }
        }
        if let Some(root) = &self.scan_root {
            ensure_absolute(root, "scan_root")?;
        }

        info!(
            mode = %self.mode,
            target_root = %self
                .target_root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".into()),
            "config validated"
        );
        Ok(())
    }
}

fn ensure_absolute(path: &Path, name: &str) -> Result<()> {
    if !path.is_absolute() {
        bail!("{name} must be an absolute path: {}", path.display());
    }
    debug!("{name} ok: {}", path.display());
    Ok(())
}
