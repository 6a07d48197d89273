//! Data model shared by the engine, the bridge and the CLI.
//! - FolderDescriptor: a candidate folder and its junction state.
//! - MoveStep / Direction: the two step sequences and their terminal states.
//! - RelocationJob: one in-flight operation; its step only ever moves forward.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::RelocateError;

/// Label used until a folder's size has been measured.
pub const SIZE_UNKNOWN: &str = "Unknown";

/// A folder as seen by discovery and mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    pub id: String,
    pub name: String,
    pub source_path: PathBuf,
    pub size_label: String,
    pub is_junction: bool,
    pub link_target: Option<PathBuf>,
}

impl FolderDescriptor {
    /// Build a descriptor for `path` with no junction information yet.
    /// The display name is the last path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let source_path = path.into();
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.display().to_string());
        Self {
            id: source_path.to_string_lossy().into_owned(),
            name,
            source_path,
            size_label: SIZE_UNKNOWN.to_string(),
            is_junction: false,
            link_target: None,
        }
    }

    /// Where this folder lands under `target_root`.
    pub fn destination_under(&self, target_root: &Path) -> PathBuf {
        target_root.join(&self.name)
    }
}

/// User-selectable copy options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocateOptions {
    /// Verify each transferred file (robocopy /V; size comparison in-process).
    pub verify_after_copy: bool,
    /// Remove destination entries that do not exist in the source (robocopy /PURGE).
    pub purge: bool,
    /// NTFS-compress the destination after the copy.
    pub compression: bool,
}

/// State-machine states for both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MoveStep {
    Idle,
    MkDir,
    BulkCopy,
    ReplaceWithJunction,
    RemoveJunction,
    BulkCopyBack,
    Done,
    Failed,
}

impl MoveStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, MoveStep::Done | MoveStep::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveStep::Idle => "Idle",
            MoveStep::MkDir => "MkDir",
            MoveStep::BulkCopy => "BulkCopy",
            MoveStep::ReplaceWithJunction => "ReplaceWithJunction",
            MoveStep::RemoveJunction => "RemoveJunction",
            MoveStep::BulkCopyBack => "BulkCopyBack",
            MoveStep::Done => "Done",
            MoveStep::Failed => "Failed",
        }
    }
}

impl fmt::Display for MoveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveStep {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = match s.trim() {
            "Idle" => MoveStep::Idle,
            "MkDir" => MoveStep::MkDir,
            "BulkCopy" => MoveStep::BulkCopy,
            "ReplaceWithJunction" => MoveStep::ReplaceWithJunction,
            "RemoveJunction" => MoveStep::RemoveJunction,
            "BulkCopyBack" => MoveStep::BulkCopyBack,
            "Done" => MoveStep::Done,
            "Failed" => MoveStep::Failed,
            other => return Err(format!("unknown step: '{other}'")),
        };
        Ok(step)
    }
}

/// Relocate (move + link) or restore (unlink + move back).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Full ordered sequence, `Idle` first and `Done` last.
    pub fn sequence(self) -> &'static [MoveStep] {
        match self {
            Direction::Forward => &[
                MoveStep::Idle,
                MoveStep::MkDir,
                MoveStep::BulkCopy,
                MoveStep::ReplaceWithJunction,
                MoveStep::Done,
            ],
            Direction::Reverse => &[
                MoveStep::Idle,
                MoveStep::RemoveJunction,
                MoveStep::BulkCopyBack,
                MoveStep::Done,
            ],
        }
    }

    fn position(self, step: MoveStep) -> Option<usize> {
        self.sequence().iter().position(|s| *s == step)
    }
}

/// Incremental copy progress reported by the telemetry reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub current_file: String,
}

/// Severity of an operator-visible log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Command,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Command => "command",
        };
        f.write_str(s)
    }
}

/// One in-flight relocation or restore.
#[derive(Debug, Clone)]
pub struct RelocationJob {
    pub folder: FolderDescriptor,
    pub target_root: PathBuf,
    pub direction: Direction,
    pub options: RelocateOptions,
    current_step: MoveStep,
    furthest_step: MoveStep,
    progress: Option<Progress>,
    pub started_at: DateTime<Local>,
}

impl RelocationJob {
    pub fn new(
        folder: FolderDescriptor,
        target_root: impl Into<PathBuf>,
        direction: Direction,
        options: RelocateOptions,
    ) -> Self {
        Self {
            folder,
            target_root: target_root.into(),
            direction,
            options,
            current_step: MoveStep::Idle,
            furthest_step: MoveStep::Idle,
            progress: None,
            started_at: Local::now(),
        }
    }

    pub fn current_step(&self) -> MoveStep {
        self.current_step
    }

    /// Last non-terminal step reached; kept after `Failed` for diagnostics.
    pub fn furthest_step(&self) -> MoveStep {
        self.furthest_step
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    /// Advance to `step`, entering every intermediate step in order.
    /// Returns the steps newly entered; empty when `step` is not ahead of the
    /// current one or the job is already terminal. `Failed` is not reachable here.
    pub fn advance_to(&mut self, step: MoveStep) -> Vec<MoveStep> {
        if self.current_step.is_terminal() {
            return Vec::new();
        }
        let (Some(from), Some(to)) = (
            self.direction.position(self.current_step),
            self.direction.position(step),
        ) else {
            return Vec::new();
        };
        if to <= from {
            return Vec::new();
        }
        let entered: Vec<MoveStep> = self.direction.sequence()[from + 1..=to].to_vec();
        self.current_step = step;
        if step != MoveStep::Done {
            self.furthest_step = step;
        }
        entered
    }

    /// Transition to `Failed`. Returns false when the job was already terminal.
    pub fn fail(&mut self) -> bool {
        if self.current_step.is_terminal() {
            return false;
        }
        self.current_step = MoveStep::Failed;
        true
    }

    /// Record progress; accepted only while non-terminal and when the file count increases.
    pub fn record_progress(&mut self, progress: Progress) -> bool {
        if self.current_step.is_terminal() {
            return false;
        }
        let last = self.progress.as_ref().map(|p| p.files_copied).unwrap_or(0);
        if progress.files_copied <= last {
            return false;
        }
        self.progress = Some(progress);
        true
    }
}

/// Terminal outcome handed to the caller.
#[derive(Debug)]
pub struct RelocationResult {
    pub success: bool,
    pub failure: Option<RelocateError>,
    pub furthest_step: MoveStep,
    pub files_copied: u64,
}

impl RelocationResult {
    pub(crate) fn succeeded(furthest_step: MoveStep, files_copied: u64) -> Self {
        Self {
            success: true,
            failure: None,
            furthest_step,
            files_copied,
        }
    }

    pub(crate) fn failed(err: RelocateError, furthest_step: MoveStep, files_copied: u64) -> Self {
        Self {
            success: false,
            failure: Some(err),
            furthest_step,
            files_copied,
        }
    }

    pub fn into_result(self) -> Result<(), RelocateError> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(direction: Direction) -> RelocationJob {
        RelocationJob::new(
            FolderDescriptor::from_path("/data/App"),
            "/mnt/store",
            direction,
            RelocateOptions::default(),
        )
    }

    #[test]
    fn descriptor_name_from_last_component() {
        let f = FolderDescriptor::from_path("/home/u/.config/Code");
        assert_eq!(f.name, "Code");
        assert_eq!(f.size_label, SIZE_UNKNOWN);
        assert_eq!(
            f.destination_under(Path::new("/mnt/store")),
            PathBuf::from("/mnt/store/Code")
        );
    }

    #[test]
    fn advance_fills_skipped_steps_in_order() {
        let mut j = job(Direction::Forward);
        let entered = j.advance_to(MoveStep::BulkCopy);
        assert_eq!(entered, vec![MoveStep::MkDir, MoveStep::BulkCopy]);
        assert_eq!(j.current_step(), MoveStep::BulkCopy);
    }

    #[test]
    fn advance_never_regresses() {
        let mut j = job(Direction::Forward);
        j.advance_to(MoveStep::ReplaceWithJunction);
        assert!(j.advance_to(MoveStep::MkDir).is_empty());
        assert_eq!(j.current_step(), MoveStep::ReplaceWithJunction);
    }

    #[test]
    fn steps_from_other_direction_are_ignored() {
        let mut j = job(Direction::Reverse);
        assert!(j.advance_to(MoveStep::BulkCopy).is_empty());
        assert_eq!(j.advance_to(MoveStep::RemoveJunction), vec![MoveStep::RemoveJunction]);
    }

    #[test]
    fn failed_is_terminal_and_keeps_furthest_step() {
        let mut j = job(Direction::Forward);
        j.advance_to(MoveStep::BulkCopy);
        assert!(j.fail());
        assert!(!j.fail());
        assert_eq!(j.current_step(), MoveStep::Failed);
        assert_eq!(j.furthest_step(), MoveStep::BulkCopy);
        assert!(j.advance_to(MoveStep::Done).is_empty());
    }

    #[test]
    fn progress_must_increase() {
        let mut j = job(Direction::Forward);
        let p = |n| Progress {
            files_copied: n,
            bytes_copied: 0,
            current_file: "f".into(),
        };
        assert!(j.record_progress(p(2)));
        assert!(!j.record_progress(p(2)));
        assert!(!j.record_progress(p(1)));
        assert!(j.record_progress(p(3)));
        j.advance_to(MoveStep::Done);
        assert!(!j.record_progress(p(4)));
    }

    #[test]
    fn step_round_trips_through_str() {
        for s in Direction::Forward.sequence() {
            assert_eq!(s.as_str().parse::<MoveStep>().unwrap(), *s);
        }
        assert!("Bogus".parse::<MoveStep>().is_err());
    }
}
