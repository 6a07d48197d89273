//! In-process interpreter for a [`Script`].
//!
//! Runs every action with the privileges of the current process and honours
//! the same exit-code contract as the rendered scripts, so the engine cannot
//! tell the difference. Used when the process is already elevated, for
//! directories the user owns, and by the test suite.
//!
//! The bulk move tries a rename per file first; files that cannot be renamed
//! (another volume) are copied, mtime-preserved, optionally size-verified and
//! then removed from the source. Files are processed in parallel.

use anyhow::{Context, Result, anyhow, bail};
use filetime::FileTime;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Elevator, ExecOutput, open_transfer_log};
use crate::platform;
use crate::script::{
    Action, EXIT_COMPRESS_FAILED, EXIT_COPY_BASE, EXIT_LINK_FAILED, EXIT_MKDIR_FAILED, EXIT_OK,
    EXIT_RMDIR_FAILED, EXIT_UNLINK_FAILED, ROBOCOPY_FAILURE_THRESHOLD, STEP_MARKER, Script,
};
use crate::shutdown;
use crate::utils::{format_bytes, io_error_with_help, io_error_with_help_io};

#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessElevator;

/// Totals for one bulk move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub files: u64,
    pub bytes: u64,
    pub purged: u64,
}

/// Append-only handle on the transfer log; each record is one `write_all`.
struct TransferLog(Mutex<File>);

impl TransferLog {
    fn open(path: &Path) -> io::Result<Self> {
        let f = open_transfer_log(path).map_err(io_error_with_help_io("open transfer log", path))?;
        Ok(Self(Mutex::new(f)))
    }

    fn append(&self, line: &str) {
        if let Ok(mut f) = self.0.lock()
            && let Err(e) = f.write_all(line.as_bytes())
        {
            debug!(error = %e, "transfer log write failed");
        }
    }
}

type StepError = (i32, anyhow::Error);

fn code(c: i32) -> impl FnOnce(anyhow::Error) -> StepError {
    move |e| (c, e)
}

impl Elevator for InProcessElevator {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn run_elevated(&self, script: &Script) -> io::Result<ExecOutput> {
        let log = TransferLog::open(&script.transfer_log)?;
        let mut stdout = String::new();
        for action in &script.actions {
            if let Err((exit_code, err)) = execute(action, &log, &mut stdout) {
                warn!(exit_code, error = %format!("{err:#}"), "in-process action failed");
                return Ok(ExecOutput {
                    exit_code,
                    stdout,
                    stderr: format!("{err:#}\n"),
                });
            }
        }
        Ok(ExecOutput {
            exit_code: EXIT_OK,
            stdout,
            stderr: String::new(),
        })
    }
}

fn execute(action: &Action, log: &TransferLog, stdout: &mut String) -> Result<(), StepError> {
    match action {
        Action::Marker(step) => log.append(&format!("{STEP_MARKER}{step}\n")),
        Action::CreateDir(p) => {
            fs::create_dir_all(p)
                .map_err(io_error_with_help("create directory", p))
                .map_err(code(EXIT_MKDIR_FAILED))?;
        }
        Action::BulkMove {
            from,
            to,
            verify,
            purge,
        } => {
            let on_file = |path: &Path, bytes: u64| {
                log.append(&format!("\tNew File\t\t{bytes}\t{}\n", path.display()));
            };
            let report = bulk_move(from, to, *verify, *purge, &on_file)
                .map_err(code(EXIT_COPY_BASE + ROBOCOPY_FAILURE_THRESHOLD))?;
            stdout.push_str(&format!(
                "moved {} files ({}) to {}\n",
                report.files,
                format_bytes(report.bytes),
                to.display()
            ));
        }
        Action::Compress(p) => compress(p, stdout).map_err(code(EXIT_COMPRESS_FAILED))?,
        Action::RemoveEmptyDir(p) => remove_empty_tree(p).map_err(code(EXIT_RMDIR_FAILED))?,
        Action::CreateJunction { link, target } => {
            platform::create_dir_link(link, target)
                .map_err(io_error_with_help("create junction", link))
                .map_err(code(EXIT_LINK_FAILED))?;
        }
        Action::RemoveJunction(p) => remove_junction(p).map_err(code(EXIT_UNLINK_FAILED))?,
    }
    Ok(())
}

/// Move the contents of `from` into `to`, calling `on_file` after each file lands.
///
/// Empty subdirectories of `from` are removed afterwards; `from` itself is
/// left in place. With `purge`, entries in `to` that do not exist in `from`
/// are deleted first.
pub fn bulk_move(
    from: &Path,
    to: &Path,
    verify: bool,
    purge: bool,
    on_file: &(dyn Fn(&Path, u64) + Sync),
) -> Result<MoveReport> {
    if shutdown::is_requested() {
        bail!("shutdown requested");
    }
    if !from.is_dir() {
        bail!("source '{}' is not a directory", from.display());
    }
    fs::create_dir_all(to).map_err(io_error_with_help("create directory", to))?;

    let purged = if purge { purge_extras(from, to)? } else { 0 };

    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", from.display()))?;
        if entry.file_type().is_dir() {
            let rel = entry.path().strip_prefix(from)?;
            let dir = to.join(rel);
            fs::create_dir_all(&dir).map_err(io_error_with_help("create directory", &dir))?;
        }
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", from.display()))?;
        if !entry.file_type().is_dir() {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push((entry.into_path(), len));
        }
    }

    let moved = AtomicU64::new(0);
    let bytes = AtomicU64::new(0);
    files.par_iter().try_for_each(|(src, len)| -> Result<()> {
        if shutdown::is_requested() {
            bail!("shutdown requested");
        }
        let dst = to.join(src.strip_prefix(from)?);
        move_file(src, &dst, verify)?;
        moved.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(*len, Ordering::Relaxed);
        on_file(src, *len);
        Ok(())
    })?;

    // Deepest first, so parents are empty by the time they are visited.
    for entry in WalkDir::new(from).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir()
            && let Err(e) = fs::remove_dir(entry.path())
        {
            debug!(dir = %entry.path().display(), error = %e, "left source directory in place");
        }
    }

    let report = MoveReport {
        files: moved.into_inner(),
        bytes: bytes.into_inner(),
        purged,
    };
    info!(
        src = %from.display(),
        dest = %to.display(),
        files = report.files,
        bytes = report.bytes,
        purged = report.purged,
        "bulk move complete"
    );
    Ok(report)
}

fn move_file(src: &Path, dst: &Path, verify: bool) -> Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let meta = fs::symlink_metadata(src).map_err(io_error_with_help("stat", src))?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dst)?;
    } else {
        fs::copy(src, dst).map_err(io_error_with_help("copy file to destination", dst))?;
        let mtime = FileTime::from_last_modification_time(&meta);
        if let Err(e) = filetime::set_file_mtime(dst, mtime) {
            debug!(file = %dst.display(), error = %e, "could not preserve mtime");
        }
        if verify {
            let copied = fs::metadata(dst).map_err(io_error_with_help("stat", dst))?.len();
            if copied != meta.len() {
                bail!(
                    "verification failed for '{}': {} bytes at source, {} at destination",
                    src.display(),
                    meta.len(),
                    copied
                );
            }
        }
    }
    fs::remove_file(src).map_err(io_error_with_help("remove source file", src))?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(io_error_with_help("read link", src))?;
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst).map_err(io_error_with_help("replace link", dst))?;
    }
    std::os::unix::fs::symlink(&target, dst).map_err(io_error_with_help("create link", dst))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(io_error_with_help("copy file to destination", dst))?;
    Ok(())
}

/// Delete entries under `to` that have no counterpart under `from`.
fn purge_extras(from: &Path, to: &Path) -> Result<u64> {
    let mut purged = 0;
    for entry in WalkDir::new(to).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("walk {}", to.display()))?;
        let rel = entry.path().strip_prefix(to)?;
        if fs::symlink_metadata(from.join(rel)).is_ok() {
            continue;
        }
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path).map_err(io_error_with_help("purge directory", path))?;
        } else {
            fs::remove_file(path).map_err(io_error_with_help("purge file", path))?;
        }
        purged += 1;
    }
    if purged > 0 {
        info!(dest = %to.display(), purged, "purged extra entries");
    }
    Ok(purged)
}

/// Remove `dir` if only empty directories remain beneath it.
fn remove_empty_tree(dir: &Path) -> Result<()> {
    if fs::symlink_metadata(dir).is_err() {
        return Ok(());
    }
    let leftover = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| !e.file_type().is_dir());
    if let Some(e) = leftover {
        bail!(
            "'{}' still contains '{}'; refusing to remove it",
            dir.display(),
            e.path().display()
        );
    }
    fs::remove_dir_all(dir).map_err(io_error_with_help("remove directory", dir))?;
    Ok(())
}

fn remove_junction(link: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(link).map_err(io_error_with_help("stat", link))?;
    if !platform::is_reparse_point(&meta) {
        return Err(anyhow!("'{}' is not a junction", link.display()));
    }
    platform::remove_dir_link(link).map_err(io_error_with_help("remove junction", link))?;
    Ok(())
}

#[cfg(windows)]
fn compress(dir: &Path, _stdout: &mut String) -> Result<()> {
    let status = std::process::Command::new("compact")
        .arg("/c")
        .arg(format!("/s:{}", dir.display()))
        .args(["/i", "/q"])
        .status()
        .context("spawn compact")?;
    if !status.success() {
        bail!("compact exited with {status}");
    }
    Ok(())
}

#[cfg(not(windows))]
fn compress(dir: &Path, stdout: &mut String) -> Result<()> {
    stdout.push_str(&format!(
        "compression is not available here; skipped {}\n",
        dir.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MoveStep, RelocateOptions};
    use tempfile::tempdir;

    fn seed(root: &Path) {
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
        fs::write(root.join("a/mid.txt"), b"middle").unwrap();
        fs::write(root.join("a/b/deep.bin"), vec![7u8; 4096]).unwrap();
    }

    #[test]
    fn bulk_move_carries_tree_and_empties_source() {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        let dst = td.path().join("dst");
        seed(&src);

        let seen = Mutex::new(Vec::new());
        let report = bulk_move(&src, &dst, true, false, &|p, n| {
            seen.lock().unwrap().push((p.to_path_buf(), n))
        })
        .unwrap();

        assert_eq!(report.files, 3);
        assert_eq!(report.bytes, 3 + 6 + 4096);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(fs::read(dst.join("a/mid.txt")).unwrap(), b"middle");
        assert_eq!(fs::read(dst.join("a/b/deep.bin")).unwrap().len(), 4096);
        assert!(src.is_dir());
        assert_eq!(fs::read_dir(&src).unwrap().count(), 0);
    }

    #[test]
    fn purge_removes_destination_extras() {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        let dst = td.path().join("dst");
        seed(&src);
        fs::create_dir_all(dst.join("stale/dir")).unwrap();
        fs::write(dst.join("stale/dir/old.txt"), b"x").unwrap();

        let report = bulk_move(&src, &dst, false, true, &|_, _| {}).unwrap();
        assert_eq!(report.purged, 3);
        assert!(!dst.join("stale").exists());
        assert!(dst.join("top.txt").exists());
    }

    #[test]
    fn remove_empty_tree_refuses_leftovers() {
        let td = tempdir().unwrap();
        let dir = td.path().join("d");
        fs::create_dir_all(dir.join("x")).unwrap();
        fs::write(dir.join("x/keep.txt"), b"k").unwrap();
        assert!(remove_empty_tree(&dir).is_err());
        assert!(dir.join("x/keep.txt").exists());

        fs::remove_file(dir.join("x/keep.txt")).unwrap();
        remove_empty_tree(&dir).unwrap();
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn forward_script_leaves_link_and_logs_markers() {
        let td = tempdir().unwrap();
        let src = td.path().join("App");
        let dst = td.path().join("store/App");
        let log = td.path().join("t.log");
        seed(&src);
        File::create(&log).unwrap();

        let script = Script::relocate(&src, &dst, &log, &RelocateOptions::default());
        let out = InProcessElevator.run_elevated(&script).unwrap();
        assert!(out.success(), "{}", out.stderr);

        assert!(fs::symlink_metadata(&src).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(src.join("top.txt")).unwrap(), b"top");
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains(&format!("{STEP_MARKER}{}", MoveStep::ReplaceWithJunction)));
        assert_eq!(text.matches("New File").count(), 3);
    }

    #[test]
    fn remove_junction_on_plain_directory_exits_93() {
        let td = tempdir().unwrap();
        let plain = td.path().join("plain");
        fs::create_dir(&plain).unwrap();
        let log = td.path().join("t.log");
        File::create(&log).unwrap();
        let script = Script::restore(&plain, &td.path().join("backing"), &log);
        let out = InProcessElevator.run_elevated(&script).unwrap();
        assert_eq!(out.exit_code, EXIT_UNLINK_FAILED);
        assert!(plain.is_dir());
    }

    #[test]
    fn missing_transfer_log_is_not_created() {
        let td = tempdir().unwrap();
        let src = td.path().join("App");
        seed(&src);
        let log = td.path().join("absent.log");
        let script = Script::relocate(&src, &td.path().join("store/App"), &log, &RelocateOptions::default());
        assert!(InProcessElevator.run_elevated(&script).is_err());
        assert!(!log.exists());
        assert!(src.join("top.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_transfer_log_is_refused() {
        let td = tempdir().unwrap();
        let src = td.path().join("App");
        let dst = td.path().join("store/App");
        seed(&src);
        let victim = td.path().join("victim.txt");
        fs::write(&victim, b"ORIGINAL\n").unwrap();
        let log = td.path().join("t.log");
        std::os::unix::fs::symlink(&victim, &log).unwrap();

        let script = Script::relocate(&src, &dst, &log, &RelocateOptions::default());
        assert!(InProcessElevator.run_elevated(&script).is_err());
        assert_eq!(fs::read(&victim).unwrap(), b"ORIGINAL\n");
        assert!(!dst.exists(), "nothing runs once the log is refused");
        assert!(src.join("top.txt").exists());
    }
}
