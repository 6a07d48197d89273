//! Candidate folder discovery.
//! Lists the immediate child directories of a scan root and annotates each
//! with its junction state. Sizes are measured separately, on demand.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::RelocateError;
use crate::inspect::ReparseInspector;
use crate::model::FolderDescriptor;
use crate::safety::VolumeProbe;
use crate::utils::format_bytes;

/// Maximum number of folders returned when no limit is given.
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// List child directories of `root`, sorted by name, at most `limit` of them.
///
/// Junctions are included (a relocated folder is still a candidate for
/// restore). Entries that cannot be inspected are skipped with a warning.
pub fn discover(
    root: &Path,
    limit: usize,
    inspector: &dyn ReparseInspector,
) -> io::Result<Vec<FolderDescriptor>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let info = match inspector.inspect(&path) {
            Ok(info) => info,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping entry that could not be inspected");
                continue;
            }
        };
        // Files are not candidates; junctions count even though they are not plain directories.
        if !info.is_junction && !entry.file_type()?.is_dir() {
            continue;
        }
        let mut folder = FolderDescriptor::from_path(path);
        folder.is_junction = info.is_junction;
        folder.link_target = info.target;
        dirs.push(folder);
    }
    dirs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    dirs.truncate(limit);
    debug!(root = %root.display(), found = dirs.len(), "scan complete");
    Ok(dirs)
}

impl FolderDescriptor {
    /// Measure the folder (through its junction, if any) and fill `size_label`.
    pub fn measure(
        &mut self,
        volume: &dyn VolumeProbe,
        limit: Option<Duration>,
    ) -> Result<u64, RelocateError> {
        let root = self.link_target.as_deref().unwrap_or(&self.source_path);
        let bytes = volume.tree_size(root, limit)?;
        self.size_label = format_bytes(bytes);
        Ok(bytes)
    }
}
