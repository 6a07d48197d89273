//! Privileged execution bridge.
//!
//! An [`Elevator`] runs one whole [`Script`] in a single invocation, asking for
//! elevation at most once and blocking until the process exits. There is no
//! cooperative cancellation: killing the elevated process is the only way to
//! stop it, and doing so mid-copy leaves a partially moved tree.
//!
//! Implementations:
//! - [`PowerShellElevator`]: Windows, UAC via `Start-Process -Verb RunAs`.
//! - [`ShellElevator`]: Unix, sh + rsync behind a prefix such as `pkexec`.
//! - [`InProcessElevator`]: interprets the plan with current privileges.
//! - [`SimulatedElevator`]: demo mode; touches nothing.

mod in_process;
mod powershell;
mod shell;
mod simulated;

pub use in_process::{InProcessElevator, MoveReport, bulk_move};
pub use powershell::PowerShellElevator;
pub use shell::ShellElevator;
pub use simulated::SimulatedElevator;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::Output;

use crate::script::Script;

/// Exit status and captured streams of an elevated run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub(crate) fn from_output(out: Output) -> Self {
        Self {
            // Killed by a signal: no code; report as a generic failure.
            exit_code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }
    }
}

/// Capability seam for running a privileged plan.
pub trait Elevator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this elevator changes the disk; false only for simulations.
    fn is_native(&self) -> bool {
        true
    }

    /// Run the whole plan once. `Err` means the process could not be started at all.
    fn run_elevated(&self, script: &Script) -> io::Result<ExecOutput>;
}

/// Open the transfer log for appending. It must already exist as a regular
/// file; a missing log or a symlink in its place is refused.
pub(crate) fn open_transfer_log(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }
    #[cfg(not(unix))]
    {
        if std::fs::symlink_metadata(path)?.file_type().is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a symlink", path.display()),
            ));
        }
    }
    let file = opts.open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }
    Ok(file)
}
