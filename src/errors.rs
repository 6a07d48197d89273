//! Typed error definitions for junction_mover.
//! Every failure a relocation or restore can end in has a variant here, with a
//! stable numeric code for logs and exit status.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::MoveStep;

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("Folder is in use by another process (write probe failed in {path}): {source}")]
    FolderLocked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Insufficient disk space for destination {dest}: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        required: u128,
        available: u128,
        dest: PathBuf,
    },

    #[error("Path is not a junction; refusing to restore: {0}")]
    NotAJunction(PathBuf),

    #[error("Junction {link} points at {target}, which no longer exists")]
    BackingDataMissing { link: PathBuf, target: PathBuf },

    #[error("Bulk copy failed with tool exit code {exit_code}")]
    CopyFailed { exit_code: i32 },

    #[error("Junction creation failed at {link} (exit code {exit_code})")]
    LinkCreationFailed { link: PathBuf, exit_code: i32 },

    #[error("Elevated process was declined or failed (exit code {exit_code})")]
    ElevationDeclinedOrFailed { exit_code: i32 },

    #[error("Source path not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("{path} is already a junction pointing at {target}")]
    AlreadyRelocated { path: PathBuf, target: PathBuf },

    #[error("Invalid destination {path}: {reason}")]
    InvalidTarget { path: PathBuf, reason: String },

    #[error("Another relocation is already running for {0}")]
    JobInProgress(PathBuf),

    #[error("Measuring {path} exceeded {limit:?} after {scanned} bytes; free space could not be verified")]
    SpaceCheckTimedOut {
        path: PathBuf,
        scanned: u64,
        limit: Duration,
    },

    #[error("Step {step} failed inside the elevated script (exit code {exit_code})")]
    StepFailed { step: MoveStep, exit_code: i32 },

    #[error("Operation interrupted by user")]
    Interrupted,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RelocateError {
    /// Stable numeric code, used as the structured `code` log field and the CLI exit status.
    pub fn code(&self) -> i32 {
        match self {
            RelocateError::FolderLocked { .. } => 10,
            RelocateError::InsufficientSpace { .. } => 11,
            RelocateError::NotAJunction(_) => 12,
            RelocateError::BackingDataMissing { .. } => 13,
            RelocateError::CopyFailed { .. } => 14,
            RelocateError::LinkCreationFailed { .. } => 15,
            RelocateError::ElevationDeclinedOrFailed { .. } => 16,
            RelocateError::SourceNotFound(_) => 17,
            RelocateError::AlreadyRelocated { .. } => 18,
            RelocateError::InvalidTarget { .. } => 19,
            RelocateError::JobInProgress(_) => 20,
            RelocateError::SpaceCheckTimedOut { .. } => 21,
            RelocateError::StepFailed { .. } => 22,
            RelocateError::Interrupted => 130,
            RelocateError::Io { .. } => 1,
        }
    }

    /// Short snake_case name for the `kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelocateError::FolderLocked { .. } => "folder_locked",
            RelocateError::InsufficientSpace { .. } => "insufficient_space",
            RelocateError::NotAJunction(_) => "not_a_junction",
            RelocateError::BackingDataMissing { .. } => "backing_data_missing",
            RelocateError::CopyFailed { .. } => "copy_failed",
            RelocateError::LinkCreationFailed { .. } => "link_creation_failed",
            RelocateError::ElevationDeclinedOrFailed { .. } => "elevation_declined_or_failed",
            RelocateError::SourceNotFound(_) => "source_not_found",
            RelocateError::AlreadyRelocated { .. } => "already_relocated",
            RelocateError::InvalidTarget { .. } => "invalid_target",
            RelocateError::JobInProgress(_) => "job_in_progress",
            RelocateError::SpaceCheckTimedOut { .. } => "space_check_timed_out",
            RelocateError::StepFailed { .. } => "step_failed",
            RelocateError::Interrupted => "interrupted",
            RelocateError::Io { .. } => "io",
        }
    }

    /// True when the error was raised before anything on disk was touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RelocateError::FolderLocked { .. }
                | RelocateError::InsufficientSpace { .. }
                | RelocateError::NotAJunction(_)
                | RelocateError::BackingDataMissing { .. }
                | RelocateError::SourceNotFound(_)
                | RelocateError::AlreadyRelocated { .. }
                | RelocateError::InvalidTarget { .. }
                | RelocateError::JobInProgress(_)
                | RelocateError::SpaceCheckTimedOut { .. }
        )
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        RelocateError::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errs = [
            RelocateError::NotAJunction(PathBuf::from("a")),
            RelocateError::SourceNotFound(PathBuf::from("a")),
            RelocateError::CopyFailed { exit_code: 8 },
            RelocateError::ElevationDeclinedOrFailed { exit_code: 1223 },
            RelocateError::JobInProgress(PathBuf::from("a")),
            RelocateError::Interrupted,
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn precondition_classification() {
        assert!(RelocateError::NotAJunction(PathBuf::from("x")).is_precondition());
        assert!(!RelocateError::CopyFailed { exit_code: 9 }.is_precondition());
        assert!(
            !RelocateError::StepFailed {
                step: MoveStep::BulkCopy,
                exit_code: 92
            }
            .is_precondition()
        );
    }

    #[test]
    fn copy_failed_message_carries_exit_code() {
        let msg = RelocateError::CopyFailed { exit_code: 16 }.to_string();
        assert!(msg.contains("16"), "msg was: {msg}");
    }
}
