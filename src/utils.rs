//! Small shared helpers: write probes, byte formatting and io::Error enrichment.
//!
//! Usage:
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create dir", dir))?;

use anyhow::anyhow;
use std::fs;
use std::io;
use std::path::Path;

/// Human-readable binary size, e.g. "1.2 GiB".
pub fn format_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;
    let f = n as f64;
    if f >= TB {
        format!("{:.1} TiB", f / TB)
    } else if f >= GB {
        format!("{:.1} GiB", f / GB)
    } else if f >= MB {
        format!("{:.1} MiB", f / MB)
    } else if f >= KB {
        format!("{:.1} KiB", f / KB)
    } else {
        format!("{} B", n)
    }
}

/// Non-destructive write probe: create and remove a marker file in `dir`.
pub(crate) fn is_writable_probe(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".junction_mover_probe_{}.tmp", std::process::id()));
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)?;
    fs::remove_file(&probe)
}

/// Format a human-friendly message with op/path plus platform-aware hints.
fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            match code {
                libc::EACCES | libc::EPERM => {
                    msg.push_str(" (permission denied; check ownership or run elevated)");
                }
                libc::EXDEV => msg.push_str(" (cross-filesystem; rename not possible)"),
                libc::EBUSY => msg.push_str(" (resource busy; close the application using it)"),
                libc::ENOENT => msg.push_str(" (path not found; verify it exists)"),
                libc::EEXIST => msg.push_str(" (already exists; remove the target first)"),
                libc::ENOSPC => msg.push_str(" (insufficient space on device)"),
                libc::EROFS => msg.push_str(" (read-only filesystem)"),
                libc::ENOTEMPTY => msg.push_str(" (directory not empty)"),
                _ => {}
            }
        }
        #[cfg(windows)]
        {
            match code {
                5 => msg.push_str(" (access denied; run elevated)"),
                17 => msg.push_str(" (not same device; cross-volume move)"),
                32 | 33 => msg.push_str(" (sharing violation; file is in use)"),
                2 | 3 => msg.push_str(" (path not found; verify it exists)"),
                80 | 183 => msg.push_str(" (already exists; remove the target first)"),
                112 => msg.push_str(" (insufficient disk space)"),
                145 => msg.push_str(" (directory not empty)"),
                _ => {}
            }
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        match e.kind() {
            io::ErrorKind::PermissionDenied => msg.push_str(" (permission denied)"),
            io::ErrorKind::NotFound => msg.push_str(" (path not found; verify it exists)"),
            io::ErrorKind::AlreadyExists => msg.push_str(" (already exists)"),
            _ => {}
        }
    }
    msg
}

/// Adapter for anyhow::Result code.
pub fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| anyhow!(build_message(op, path, &e))
}

/// Adapter for io::Result code; keeps the original ErrorKind.
pub fn io_error_with_help_io<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> io::Error + 'a {
    move |e: io::Error| io::Error::new(e.kind(), build_message(op, path, &e))
}
