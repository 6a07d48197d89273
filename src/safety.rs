//! Safety preconditions run before any destructive step.
//!
//! Two independent checks:
//! - lock: a create-and-delete write probe inside the folder. A failure is read
//!   as "held open by another process". This is a heuristic; a process can
//!   still open the folder after the probe succeeds.
//! - space: free space on the destination volume must cover the source tree
//!   plus a margin (10% by default). Also time-of-check only.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::RelocateError;
use crate::platform::free_space_bytes;
use crate::shutdown;
use crate::utils::{format_bytes, is_writable_probe};

/// Default safety margin on top of the source size.
pub const DEFAULT_SPACE_MARGIN_PERCENT: u32 = 10;

/// Capability seam for volume queries, so tests can fake free space.
pub trait VolumeProbe: Send + Sync {
    /// Bytes available on the volume that holds (or would hold) `path`.
    fn free_space(&self, path: &Path) -> io::Result<u64>;

    /// Total size of regular files under `root`, giving up after `limit`.
    fn tree_size(&self, root: &Path, limit: Option<Duration>) -> Result<u64, RelocateError>;

    /// Non-destructive write probe inside `dir`.
    fn probe_writable(&self, dir: &Path) -> io::Result<()>;
}

/// The real disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeVolume;

impl VolumeProbe for NativeVolume {
    fn free_space(&self, path: &Path) -> io::Result<u64> {
        free_space_bytes(path)
    }

    fn tree_size(&self, root: &Path, limit: Option<Duration>) -> Result<u64, RelocateError> {
        let started = Instant::now();
        let mut total: u64 = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            if shutdown::is_requested() {
                return Err(RelocateError::Interrupted);
            }
            if let Some(limit) = limit
                && started.elapsed() >= limit
            {
                return Err(RelocateError::SpaceCheckTimedOut {
                    path: root.to_path_buf(),
                    scanned: total,
                    limit,
                });
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry while measuring");
                    continue;
                }
            };
            if entry.file_type().is_file()
                && let Ok(meta) = entry.metadata()
            {
                total = total.saturating_add(meta.len());
            }
        }
        Ok(total)
    }

    fn probe_writable(&self, dir: &Path) -> io::Result<()> {
        is_writable_probe(dir)
    }
}

/// Outcome of a passed space check, for the operator log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceReport {
    pub source_bytes: u64,
    pub required_bytes: u128,
    pub available_bytes: u64,
}

impl SpaceReport {
    pub fn summary(&self) -> String {
        format!(
            "source {} (need {} with margin), destination has {} free",
            format_bytes(self.source_bytes),
            format_bytes(u64::try_from(self.required_bytes).unwrap_or(u64::MAX)),
            format_bytes(self.available_bytes)
        )
    }
}

/// Runs the lock and space checks with the configured margin and scan cap.
#[derive(Debug, Clone)]
pub struct SafetyChecker {
    pub margin_percent: u32,
    pub size_scan_limit: Option<Duration>,
}

impl Default for SafetyChecker {
    fn default() -> Self {
        Self {
            margin_percent: DEFAULT_SPACE_MARGIN_PERCENT,
            size_scan_limit: Some(Duration::from_secs(120)),
        }
    }
}

impl SafetyChecker {
    /// Bytes required on the destination for a source of `source_bytes`.
    pub fn required_bytes(&self, source_bytes: u64) -> u128 {
        let scaled = source_bytes as u128 * (100 + self.margin_percent as u128);
        scaled.div_ceil(100)
    }

    pub fn check_lock(&self, probe: &dyn VolumeProbe, dir: &Path) -> Result<(), RelocateError> {
        match probe.probe_writable(dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "write probe succeeded");
                Ok(())
            }
            Err(source) => {
                warn!(path = %dir.display(), error = %source, "write probe failed; treating folder as locked");
                Err(RelocateError::FolderLocked {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// `dest` may not exist yet; free space is read from its nearest existing ancestor.
    pub fn check_space(
        &self,
        probe: &dyn VolumeProbe,
        source: &Path,
        dest: &Path,
    ) -> Result<SpaceReport, RelocateError> {
        let source_bytes = probe.tree_size(source, self.size_scan_limit)?;
        let available_bytes = probe
            .free_space(dest)
            .map_err(|e| RelocateError::io(format!("query free space for {}", dest.display()), e))?;
        let required_bytes = self.required_bytes(source_bytes);
        if (available_bytes as u128) < required_bytes {
            return Err(RelocateError::InsufficientSpace {
                required: required_bytes,
                available: available_bytes as u128,
                dest: dest.to_path_buf(),
            });
        }
        let report = SpaceReport {
            source_bytes,
            required_bytes,
            available_bytes,
        };
        info!(source = %source.display(), dest = %dest.display(), "{}", report.summary());
        Ok(report)
    }

    /// Lock check first, then space; the first failure wins.
    pub fn run(
        &self,
        probe: &dyn VolumeProbe,
        lock_dir: &Path,
        source: &Path,
        dest: &Path,
    ) -> Result<SpaceReport, RelocateError> {
        self.check_lock(probe, lock_dir)?;
        self.check_space(probe, source, dest)
    }
}

/// A probe with fixed answers, for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedVolume {
    pub free_bytes: u64,
    pub tree_bytes: u64,
    pub locked: Vec<PathBuf>,
}

impl VolumeProbe for FixedVolume {
    fn free_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free_bytes)
    }

    fn tree_size(&self, _root: &Path, _limit: Option<Duration>) -> Result<u64, RelocateError> {
        Ok(self.tree_bytes)
    }

    fn probe_writable(&self, dir: &Path) -> io::Result<()> {
        if self.locked.iter().any(|p| p == dir) {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is in use by another process",
            ))
        } else {
            Ok(())
        }
    }
}
