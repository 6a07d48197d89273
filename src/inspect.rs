//! Reparse-point inspection.
//! Decides whether a path is a relocation junction and resolves where it points.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::platform::is_reparse_point;

/// Result of inspecting a path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkInfo {
    pub is_junction: bool,
    pub target: Option<PathBuf>,
}

/// Capability seam for junction detection, so tests and simulated runs can substitute it.
pub trait ReparseInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> io::Result<LinkInfo>;
}

/// Reads filesystem attributes of the real disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeInspector;

impl ReparseInspector for NativeInspector {
    fn inspect(&self, path: &Path) -> io::Result<LinkInfo> {
        let meta = fs::symlink_metadata(path)?;
        if !is_reparse_point(&meta) {
            return Ok(LinkInfo::default());
        }
        let raw = fs::read_link(path)?;
        let target = if raw.is_relative() {
            path.parent().map(|p| p.join(&raw)).unwrap_or(raw)
        } else {
            raw
        };
        // Junction targets come back with a verbatim prefix on Windows.
        Ok(LinkInfo {
            is_junction: true,
            target: Some(dunce::simplified(&target).to_path_buf()),
        })
    }
}
