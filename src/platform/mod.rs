//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the rest of the codebase can remain platform-agnostic.
//!
//! On Unix a symbolic link plays the role of the Windows directory junction.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::io;
use std::path::Path;

#[cfg(unix)]
pub use unix::{
    create_dir_link, is_elevated, is_reparse_point, open_log_file_secure_append,
    remove_dir_link, set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600,
};

#[cfg(windows)]
pub use windows::{
    create_dir_link, is_elevated, is_reparse_point, open_log_file_secure_append,
    remove_dir_link, set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600,
};

/// Bytes available to the current user on the volume holding `path`.
/// Walks up to the nearest existing ancestor so a not-yet-created
/// destination can still be measured.
pub fn free_space_bytes(path: &Path) -> io::Result<u64> {
    let mut probe = Some(path);
    while let Some(p) = probe {
        if p.exists() {
            return fs2::available_space(p);
        }
        probe = p.parent();
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no existing ancestor for {}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn free_space_of_missing_child_uses_ancestor() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not").join("yet");
        let bytes = free_space_bytes(&missing).unwrap();
        assert!(bytes > 0);
    }
}
