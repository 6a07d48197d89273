//! Relocation state machine.
//!
//! `relocate` runs MkDir -> BulkCopy -> ReplaceWithJunction and `restore` runs
//! RemoveJunction -> BulkCopyBack, each as one privileged script. Preconditions
//! and safety checks run unprivileged first so no elevation is requested for
//! an operation already known to be unsafe. While the script runs, a monitor
//! thread tails the transfer log and feeds steps and progress into the job.
//!
//! The lock and space checks are time-of-check heuristics: another process
//! can still open a file or fill the volume after they pass.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bridge::Elevator;
use crate::errors::RelocateError;
use crate::inspect::{LinkInfo, NativeInspector, ReparseInspector};
use crate::model::{
    Direction, FolderDescriptor, MoveStep, Progress, RelocateOptions, RelocationJob,
    RelocationResult, Severity,
};
use crate::safety::{NativeVolume, SafetyChecker, VolumeProbe};
use crate::script::Script;
use crate::shutdown;
use crate::telemetry::{self, DEFAULT_POLL_INTERVAL, TRANSFER_LOG_NAME, TelemetryEvent, TransferLogDir};

/// Receives step, progress and log events for one job. Called from the
/// monitor thread as well as the caller's thread.
pub trait JobObserver: Sync {
    fn on_step(&self, _step: MoveStep) {}
    fn on_progress(&self, _progress: &Progress) {}
    fn on_log(&self, _message: &str, _severity: Severity) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl JobObserver for NullObserver {}

/// Log path shown in plans. Each run replaces it with a fresh private directory.
fn planned_log_path() -> PathBuf {
    std::env::temp_dir()
        .join("junction_mover-XXXXXX")
        .join(TRANSFER_LOG_NAME)
}

/// Releases the registry slot for a source path when dropped.
struct JobSlot<'a> {
    active: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for JobSlot<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

pub struct RelocationEngine {
    elevator: Box<dyn Elevator>,
    inspector: Box<dyn ReparseInspector>,
    volume: Box<dyn VolumeProbe>,
    checker: SafetyChecker,
    native_checks: bool,
    poll_interval: Duration,
    active: Mutex<HashSet<PathBuf>>,
}

impl RelocationEngine {
    /// Engine over the real disk. Safety checks run unless the elevator is a simulation.
    pub fn new(elevator: Box<dyn Elevator>) -> Self {
        let native_checks = elevator.is_native();
        Self {
            elevator,
            inspector: Box::new(NativeInspector),
            volume: Box::new(NativeVolume),
            checker: SafetyChecker::default(),
            native_checks,
            poll_interval: DEFAULT_POLL_INTERVAL,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_inspector(mut self, inspector: Box<dyn ReparseInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_volume(mut self, volume: Box<dyn VolumeProbe>) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_checker(mut self, checker: SafetyChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Force safety checks on or off; off is announced on every job.
    pub fn with_native_checks(mut self, enabled: bool) -> Self {
        self.native_checks = enabled;
        self
    }

    pub fn elevator_name(&self) -> &'static str {
        self.elevator.name()
    }

    /// Inspect `path`; a missing path is `SourceNotFound`.
    pub fn inspect(&self, path: &Path) -> Result<LinkInfo, RelocateError> {
        self.inspector.inspect(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RelocateError::SourceNotFound(path.to_path_buf()),
            _ => RelocateError::io(format!("inspect {}", path.display()), e),
        })
    }

    /// Keyed by the resolved parent so two spellings of one folder share a slot.
    fn claim(&self, path: &Path) -> Result<JobSlot<'_>, RelocateError> {
        let key = resolve_parent(path);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(RelocateError::JobInProgress(path.to_path_buf()));
        }
        Ok(JobSlot {
            active: &self.active,
            path: key,
        })
    }

    /// Validate a relocation and build its script without running anything.
    pub fn plan_relocate(
        &self,
        folder: &FolderDescriptor,
        target_root: &Path,
        options: RelocateOptions,
    ) -> Result<Script, RelocateError> {
        let source = &folder.source_path;
        let meta = fs::symlink_metadata(source)
            .map_err(|_| RelocateError::SourceNotFound(source.clone()))?;
        let info = self.inspect(source)?;
        if info.is_junction {
            return Err(RelocateError::AlreadyRelocated {
                path: source.clone(),
                target: info.target.unwrap_or_default(),
            });
        }
        if !meta.is_dir() {
            return Err(RelocateError::InvalidTarget {
                path: source.clone(),
                reason: "source is not a directory".into(),
            });
        }

        let dest = folder.destination_under(target_root);
        validate_destination(source, &dest, options.purge)?;
        Ok(Script::relocate(source, &dest, &planned_log_path(), &options))
    }

    /// Validate a restore and build its script. Both gates run before anything is removed.
    pub fn plan_restore(&self, folder: &FolderDescriptor) -> Result<(Script, PathBuf), RelocateError> {
        let link = &folder.source_path;
        let info = self.inspect(link)?;
        if !info.is_junction {
            return Err(RelocateError::NotAJunction(link.clone()));
        }
        let backing = info
            .target
            .ok_or_else(|| RelocateError::NotAJunction(link.clone()))?;
        if !backing.is_dir() {
            return Err(RelocateError::BackingDataMissing {
                link: link.clone(),
                target: backing,
            });
        }
        Ok((Script::restore(link, &backing, &planned_log_path()), backing))
    }

    /// Move `folder` under `target_root` and leave a junction at its original path.
    pub fn relocate(
        &self,
        folder: &mut FolderDescriptor,
        target_root: &Path,
        options: RelocateOptions,
        observer: &dyn JobObserver,
    ) -> RelocationResult {
        let job = Mutex::new(RelocationJob::new(
            folder.clone(),
            target_root,
            Direction::Forward,
            options,
        ));
        info!(source = %folder.source_path.display(), target_root = %target_root.display(), "relocation requested");

        let _slot = match self.claim(&folder.source_path) {
            Ok(slot) => slot,
            Err(err) => return self.finish_failed(&job, err, observer),
        };

        match self.run_relocate(folder, target_root, options, &job, observer) {
            Ok(dest) => {
                folder.is_junction = true;
                folder.link_target = Some(dest.clone());
                observer.on_log(
                    &format!("{} now points at {}", folder.source_path.display(), dest.display()),
                    Severity::Success,
                );
                self.finish_ok(&job, observer)
            }
            Err(err) => self.finish_failed(&job, err, observer),
        }
    }

    /// Remove the junction at `folder` and move its backing data back.
    pub fn restore(&self, folder: &mut FolderDescriptor, observer: &dyn JobObserver) -> RelocationResult {
        let target_root = folder
            .link_target
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let job = Mutex::new(RelocationJob::new(
            folder.clone(),
            target_root,
            Direction::Reverse,
            RelocateOptions::default(),
        ));
        info!(link = %folder.source_path.display(), "restore requested");

        let _slot = match self.claim(&folder.source_path) {
            Ok(slot) => slot,
            Err(err) => return self.finish_failed(&job, err, observer),
        };

        match self.run_restore(folder, &job, observer) {
            Ok(()) => {
                folder.is_junction = false;
                folder.link_target = None;
                observer.on_log(
                    &format!("{} restored to its original location", folder.source_path.display()),
                    Severity::Success,
                );
                self.finish_ok(&job, observer)
            }
            Err(err) => self.finish_failed(&job, err, observer),
        }
    }

    fn run_relocate(
        &self,
        folder: &FolderDescriptor,
        target_root: &Path,
        options: RelocateOptions,
        job: &Mutex<RelocationJob>,
        observer: &dyn JobObserver,
    ) -> Result<PathBuf, RelocateError> {
        let script = self.plan_relocate(folder, target_root, options)?;
        let dest = folder.destination_under(target_root);
        observer.on_log(
            &format!("Relocating {} to {}", folder.source_path.display(), dest.display()),
            Severity::Info,
        );
        self.preflight(&folder.source_path, &folder.source_path, &dest, observer)?;
        match self.run_script(job, script, observer) {
            Ok(()) => Ok(dest),
            Err(err @ RelocateError::LinkCreationFailed { .. }) => {
                log_link_recovery(&folder.source_path, &dest, observer);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn run_restore(
        &self,
        folder: &FolderDescriptor,
        job: &Mutex<RelocationJob>,
        observer: &dyn JobObserver,
    ) -> Result<(), RelocateError> {
        let (script, backing) = self.plan_restore(folder)?;
        observer.on_log(
            &format!("Restoring {} from {}", folder.source_path.display(), backing.display()),
            Severity::Info,
        );
        // Free space is measured on the volume holding the link, not the one it points at.
        let home = folder
            .source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| folder.source_path.clone());
        self.preflight(&backing, &backing, &home, observer)?;
        match self.run_script(job, script, observer) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Once the link is gone the data may sit partly on each side.
                let link_intact = self
                    .inspect(&folder.source_path)
                    .map(|info| info.is_junction)
                    .unwrap_or(false);
                if !link_intact && backing.exists() {
                    log_restore_recovery(&folder.source_path, &backing, observer);
                }
                Err(err)
            }
        }
    }

    fn preflight(
        &self,
        lock_dir: &Path,
        source: &Path,
        dest: &Path,
        observer: &dyn JobObserver,
    ) -> Result<(), RelocateError> {
        if !self.native_checks {
            warn!("safety checks skipped: native checks unavailable in this mode");
            observer.on_log(
                "Simulation mode: lock and space checks skipped; no files will be moved",
                Severity::Warning,
            );
            return Ok(());
        }
        observer.on_log(
            &format!("Checking that {} is not in use", lock_dir.display()),
            Severity::Info,
        );
        let report = self.checker.run(self.volume.as_ref(), lock_dir, source, dest)?;
        observer.on_log(&format!("Space check passed: {}", report.summary()), Severity::Success);
        Ok(())
    }

    fn run_script(
        &self,
        job: &Mutex<RelocationJob>,
        mut script: Script,
        observer: &dyn JobObserver,
    ) -> Result<(), RelocateError> {
        if shutdown::is_requested() {
            return Err(RelocateError::Interrupted);
        }
        let log_dir = TransferLogDir::create()
            .map_err(|e| RelocateError::io("create transfer log directory", e))?;
        script.transfer_log = log_dir.log_path().to_path_buf();
        for cmd in script.describe() {
            info!(command = %cmd, "privileged command");
            observer.on_log(&cmd, Severity::Command);
        }
        observer.on_log(
            &format!("Running privileged script via {}", self.elevator.name()),
            Severity::Info,
        );

        let sink = |event: TelemetryEvent| apply_event(job, event, observer);
        let output = telemetry::observe_while(&script.transfer_log, self.poll_interval, &sink, || {
            self.elevator.run_elevated(&script)
        });
        log_dir.close();
        let output =
            output.map_err(|e| RelocateError::io(format!("launch {} bridge", self.elevator.name()), e))?;

        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(line, "script stdout");
        }
        let severity = if output.success() {
            Severity::Info
        } else {
            Severity::Error
        };
        observer.on_log(
            &format!("Privileged script exited with code {}", output.exit_code),
            severity,
        );
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!(line, "script stderr");
            observer.on_log(line.trim(), Severity::Error);
        }

        if !output.success() && shutdown::is_requested() {
            return Err(RelocateError::Interrupted);
        }
        script.classify_exit(output.exit_code)
    }

    fn finish_ok(&self, job: &Mutex<RelocationJob>, observer: &dyn JobObserver) -> RelocationResult {
        let mut job = job.lock().unwrap_or_else(PoisonError::into_inner);
        for step in job.advance_to(MoveStep::Done) {
            observer.on_step(step);
        }
        let files = job.progress().map(|p| p.files_copied).unwrap_or(0);
        info!(files, elapsed_ms = elapsed_ms(&job), "job complete");
        RelocationResult::succeeded(job.furthest_step(), files)
    }

    fn finish_failed(
        &self,
        job: &Mutex<RelocationJob>,
        err: RelocateError,
        observer: &dyn JobObserver,
    ) -> RelocationResult {
        let mut job = job.lock().unwrap_or_else(PoisonError::into_inner);
        if job.fail() {
            observer.on_step(MoveStep::Failed);
        }
        let furthest = job.furthest_step();
        let files = job.progress().map(|p| p.files_copied).unwrap_or(0);
        error!(
            code = err.code(),
            kind = err.kind(),
            furthest_step = %furthest,
            files,
            "job failed: {err}"
        );
        observer.on_log(
            &format!("{err} [code {}, furthest step {furthest}]", err.code()),
            Severity::Error,
        );
        RelocationResult::failed(err, furthest, files)
    }
}

fn elapsed_ms(job: &RelocationJob) -> i64 {
    (chrono::Local::now() - job.started_at).num_milliseconds()
}

fn apply_event(job: &Mutex<RelocationJob>, event: TelemetryEvent, observer: &dyn JobObserver) {
    match event {
        TelemetryEvent::Step(step) => {
            let entered = job
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .advance_to(step);
            for s in entered {
                debug!(step = %s, "step entered");
                observer.on_step(s);
            }
        }
        TelemetryEvent::Progress(progress) => {
            let accepted = job
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_progress(progress.clone());
            if accepted {
                observer.on_progress(&progress);
            }
        }
    }
}

fn comparable(p: &Path) -> PathBuf {
    dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}

/// Canonical parent plus the final component as given; the leaf may be a link.
fn resolve_parent(p: &Path) -> PathBuf {
    match (p.parent(), p.file_name()) {
        (Some(parent), Some(name)) => comparable(parent).join(name),
        _ => p.to_path_buf(),
    }
}

fn validate_destination(source: &Path, dest: &Path, purge: bool) -> Result<(), RelocateError> {
    let src = comparable(source);
    let dst = resolve_parent(dest);
    if dst == src {
        return Err(RelocateError::InvalidTarget {
            path: dest.to_path_buf(),
            reason: "destination is the source itself".into(),
        });
    }
    if dst.starts_with(&src) {
        return Err(RelocateError::InvalidTarget {
            path: dest.to_path_buf(),
            reason: "destination lies inside the source".into(),
        });
    }
    if !purge
        && let Ok(mut entries) = fs::read_dir(dest)
        && entries.next().is_some()
    {
        return Err(RelocateError::InvalidTarget {
            path: dest.to_path_buf(),
            reason: "destination already exists and is not empty (use purge to mirror over it)".into(),
        });
    }
    if dest.exists() && !dest.is_dir() {
        return Err(RelocateError::InvalidTarget {
            path: dest.to_path_buf(),
            reason: "destination exists and is not a directory".into(),
        });
    }
    Ok(())
}

fn log_link_recovery(source: &Path, dest: &Path, observer: &dyn JobObserver) {
    let link_cmd = if cfg!(windows) {
        format!("mklink /J \"{}\" \"{}\"", source.display(), dest.display())
    } else {
        format!("ln -s \"{}\" \"{}\"", dest.display(), source.display())
    };
    let msg = format!(
        "Data now lives at {} and nothing exists at {}. Recover by creating the link manually ({}) or by moving {} back to {}.",
        dest.display(),
        source.display(),
        link_cmd,
        dest.display(),
        source.display()
    );
    error!(source = %source.display(), dest = %dest.display(), "junction missing after copy");
    observer.on_log(&msg, Severity::Error);
}

fn log_restore_recovery(link: &Path, backing: &Path, observer: &dyn JobObserver) {
    let (move_cmd, link_cmd) = if cfg!(windows) {
        (
            format!("robocopy \"{}\" \"{}\" /E /MOVE", backing.display(), link.display()),
            format!("mklink /J \"{}\" \"{}\"", link.display(), backing.display()),
        )
    } else {
        (
            format!(
                "rsync -a --remove-source-files \"{}/\" \"{}/\"",
                backing.display(),
                link.display()
            ),
            format!("ln -s \"{}\" \"{}\"", backing.display(), link.display()),
        )
    };
    let msg = format!(
        "The link at {} was removed but files may remain in {}. Finish the restore by moving the rest back ({}), or move {} back into {} and recreate the link ({}).",
        link.display(),
        backing.display(),
        move_cmd,
        link.display(),
        backing.display(),
        link_cmd
    );
    error!(link = %link.display(), backing = %backing.display(), "restore stopped with data on both sides");
    observer.on_log(&msg, Severity::Error);
}
