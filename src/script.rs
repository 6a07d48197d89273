//! Privileged script plans.
//!
//! A relocation or restore is one ordered list of [`Action`]s handed to the
//! bridge in a single elevated invocation. The list is data, so ordering is
//! testable without running anything; renderers turn it into PowerShell
//! (robocopy + junction) or POSIX sh (rsync + symlink).
//!
//! Exit-code contract shared by every renderer and the in-process interpreter:
//!
//! | code        | meaning                                   |
//! |-------------|-------------------------------------------|
//! | 0           | success                                   |
//! | 90          | link creation failed                      |
//! | 91          | create directory failed                   |
//! | 92          | remove source/backing directory failed    |
//! | 93          | remove junction failed                    |
//! | 94          | compression failed                        |
//! | 100 + tool  | bulk copy tool reported failure           |
//! | 1223        | elevation declined                        |

use base64::{Engine as _, engine::general_purpose};
use std::path::{Path, PathBuf};

use crate::errors::RelocateError;
use crate::model::{Direction, MoveStep, RelocateOptions};

pub const EXIT_OK: i32 = 0;
pub const EXIT_LINK_FAILED: i32 = 90;
pub const EXIT_MKDIR_FAILED: i32 = 91;
pub const EXIT_RMDIR_FAILED: i32 = 92;
pub const EXIT_UNLINK_FAILED: i32 = 93;
pub const EXIT_COMPRESS_FAILED: i32 = 94;
pub const EXIT_COPY_BASE: i32 = 100;
pub const EXIT_ELEVATION_DECLINED: i32 = 1223;

/// Robocopy signals failure from 8 upward; 0-7 are degrees of success.
pub const ROBOCOPY_FAILURE_THRESHOLD: i32 = 8;

/// Prefix of the step marker lines appended to the transfer log.
pub const STEP_MARKER: &str = "::step::";

/// One privileged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Record that the script entered `step` (written to the transfer log).
    Marker(MoveStep),
    CreateDir(PathBuf),
    /// Mirror `from` into `to` with move semantics, logging each transferred file.
    BulkMove {
        from: PathBuf,
        to: PathBuf,
        verify: bool,
        purge: bool,
    },
    Compress(PathBuf),
    /// Remove a directory that the bulk move left empty. Fails if files remain.
    RemoveEmptyDir(PathBuf),
    CreateJunction { link: PathBuf, target: PathBuf },
    RemoveJunction(PathBuf),
}

impl Action {
    /// Operator-facing command line for the audit log; markers have none.
    pub fn describe(&self) -> Option<String> {
        let s = match self {
            Action::Marker(_) => return None,
            Action::CreateDir(p) => format!("mkdir \"{}\"", p.display()),
            Action::BulkMove {
                from,
                to,
                verify,
                purge,
            } => {
                let mut s = format!("bulk-move \"{}\" -> \"{}\" /MOVE /E", from.display(), to.display());
                if *verify {
                    s.push_str(" /V");
                }
                if *purge {
                    s.push_str(" /PURGE");
                }
                s
            }
            Action::Compress(p) => format!("compact /c /s \"{}\"", p.display()),
            Action::RemoveEmptyDir(p) => format!("rmdir \"{}\"", p.display()),
            Action::CreateJunction { link, target } => {
                format!("mklink /J \"{}\" \"{}\"", link.display(), target.display())
            }
            Action::RemoveJunction(p) => format!("rmdir (junction) \"{}\"", p.display()),
        };
        Some(s)
    }
}

/// An ordered plan plus the side-channel log it reports through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub direction: Direction,
    pub actions: Vec<Action>,
    pub transfer_log: PathBuf,
}

impl Script {
    /// MkDir -> BulkCopy -> remove source root -> ReplaceWithJunction.
    pub fn relocate(source: &Path, dest: &Path, transfer_log: &Path, options: &RelocateOptions) -> Self {
        let mut actions = vec![
            Action::Marker(MoveStep::MkDir),
            Action::CreateDir(dest.to_path_buf()),
            Action::Marker(MoveStep::BulkCopy),
            Action::BulkMove {
                from: source.to_path_buf(),
                to: dest.to_path_buf(),
                verify: options.verify_after_copy,
                purge: options.purge,
            },
        ];
        if options.compression {
            actions.push(Action::Compress(dest.to_path_buf()));
        }
        // The link cannot be created while anything occupies the source path.
        actions.push(Action::RemoveEmptyDir(source.to_path_buf()));
        actions.push(Action::Marker(MoveStep::ReplaceWithJunction));
        actions.push(Action::CreateJunction {
            link: source.to_path_buf(),
            target: dest.to_path_buf(),
        });
        Self {
            direction: Direction::Forward,
            actions,
            transfer_log: transfer_log.to_path_buf(),
        }
    }

    /// RemoveJunction -> BulkCopyBack -> remove emptied backing directory.
    pub fn restore(link: &Path, backing: &Path, transfer_log: &Path) -> Self {
        let actions = vec![
            Action::Marker(MoveStep::RemoveJunction),
            Action::RemoveJunction(link.to_path_buf()),
            Action::Marker(MoveStep::BulkCopyBack),
            Action::BulkMove {
                from: backing.to_path_buf(),
                to: link.to_path_buf(),
                verify: false,
                purge: false,
            },
            Action::RemoveEmptyDir(backing.to_path_buf()),
        ];
        Self {
            direction: Direction::Reverse,
            actions,
            transfer_log: transfer_log.to_path_buf(),
        }
    }

    /// Steps in the order their markers appear.
    pub fn steps(&self) -> Vec<MoveStep> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Action::Marker(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Audit-log lines, one per non-marker action.
    pub fn describe(&self) -> Vec<String> {
        self.actions.iter().filter_map(Action::describe).collect()
    }

    fn junction_link(&self) -> Option<PathBuf> {
        self.actions.iter().find_map(|a| match a {
            Action::CreateJunction { link, .. } => Some(link.clone()),
            _ => None,
        })
    }

    /// Map the script's exit code onto a typed outcome.
    pub fn classify_exit(&self, code: i32) -> Result<(), RelocateError> {
        match code {
            EXIT_OK => Ok(()),
            EXIT_LINK_FAILED => Err(RelocateError::LinkCreationFailed {
                link: self.junction_link().unwrap_or_default(),
                exit_code: code,
            }),
            EXIT_MKDIR_FAILED => Err(RelocateError::StepFailed {
                step: MoveStep::MkDir,
                exit_code: code,
            }),
            EXIT_RMDIR_FAILED => Err(RelocateError::StepFailed {
                step: match self.direction {
                    Direction::Forward => MoveStep::ReplaceWithJunction,
                    Direction::Reverse => MoveStep::BulkCopyBack,
                },
                exit_code: code,
            }),
            EXIT_UNLINK_FAILED => Err(RelocateError::StepFailed {
                step: MoveStep::RemoveJunction,
                exit_code: code,
            }),
            EXIT_COMPRESS_FAILED => Err(RelocateError::StepFailed {
                step: MoveStep::BulkCopy,
                exit_code: code,
            }),
            c if (EXIT_COPY_BASE..EXIT_COPY_BASE + 256).contains(&c) => {
                Err(RelocateError::CopyFailed {
                    exit_code: c - EXIT_COPY_BASE,
                })
            }
            other => Err(RelocateError::ElevationDeclinedOrFailed { exit_code: other }),
        }
    }
}

/// Quote for a PowerShell single-quoted literal.
pub fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote for a POSIX sh single-quoted literal.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn ps_path(p: &Path) -> String {
    ps_quote(&p.display().to_string())
}

fn sh_path(p: &Path) -> String {
    sh_quote(&p.display().to_string())
}

/// Render the plan as a PowerShell script (robocopy + junction).
pub fn render_powershell(script: &Script) -> String {
    let mut out = String::new();
    out.push_str("$ErrorActionPreference = 'Stop'\n");
    out.push_str(&format!("$log = {}\n", ps_path(&script.transfer_log)));
    out.push_str("function Mark($s) { Add-Content -LiteralPath $log -Value ('::step::' + $s) }\n");

    for action in &script.actions {
        let block = match action {
            Action::Marker(step) => format!("Mark {}", ps_quote(step.as_str())),
            Action::CreateDir(p) => format!(
                "try {{ if (!(Test-Path -LiteralPath {p})) {{ New-Item -ItemType Directory -Force -Path {p} | Out-Null }} }} catch {{ exit {EXIT_MKDIR_FAILED} }}",
                p = ps_path(p)
            ),
            Action::BulkMove {
                from,
                to,
                verify,
                purge,
            } => {
                let mut args = vec![
                    ps_path(from),
                    ps_path(to),
                    "'/MOVE'".to_string(),
                    "'/E'".to_string(),
                    "'/COPYALL'".to_string(),
                    "'/R:1'".to_string(),
                    "'/W:1'".to_string(),
                    "'/NP'".to_string(),
                    "'/BYTES'".to_string(),
                    "'/FP'".to_string(),
                    "'/NDL'".to_string(),
                    "'/NJH'".to_string(),
                    "'/NJS'".to_string(),
                ];
                if *verify {
                    args.push("'/V'".to_string());
                }
                if *purge {
                    args.push("'/PURGE'".to_string());
                }
                args.push("('/LOG+:' + $log)".to_string());
                format!(
                    "& robocopy.exe {} | Out-Null\n$rc = $LASTEXITCODE\nif ($rc -ge {ROBOCOPY_FAILURE_THRESHOLD}) {{ exit ({EXIT_COPY_BASE} + $rc) }}",
                    args.join(" ")
                )
            }
            Action::Compress(p) => format!(
                "& compact.exe /c /s:{} /i /q | Out-Null\nif ($LASTEXITCODE -ne 0) {{ exit {EXIT_COMPRESS_FAILED} }}",
                ps_path(p)
            ),
            Action::RemoveEmptyDir(p) => format!(
                "if (Test-Path -LiteralPath {p}) {{\n  $left = @(Get-ChildItem -LiteralPath {p} -Recurse -Force -File -ErrorAction SilentlyContinue).Count\n  if ($left -gt 0) {{ exit {EXIT_RMDIR_FAILED} }}\n  try {{ Remove-Item -LiteralPath {p} -Force -Recurse }} catch {{ exit {EXIT_RMDIR_FAILED} }}\n}}",
                p = ps_path(p)
            ),
            Action::CreateJunction { link, target } => format!(
                "try {{ New-Item -ItemType Junction -Path {} -Target {} | Out-Null }} catch {{ exit {EXIT_LINK_FAILED} }}",
                ps_path(link),
                ps_path(target)
            ),
            Action::RemoveJunction(p) => format!(
                "try {{ $item = Get-Item -LiteralPath {p} -Force; if (-not ($item.Attributes -band [IO.FileAttributes]::ReparsePoint)) {{ exit {EXIT_UNLINK_FAILED} }}; $item.Delete() }} catch {{ exit {EXIT_UNLINK_FAILED} }}",
                p = ps_path(p)
            ),
        };
        out.push_str(&block);
        out.push('\n');
    }
    out.push_str("exit 0\n");
    out
}

/// Base64 of the UTF-16LE bytes, as `powershell -EncodedCommand` expects.
pub fn encode_powershell(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    general_purpose::STANDARD.encode(bytes)
}

/// Render the plan as a POSIX sh script (rsync + symlink).
pub fn render_posix(script: &Script) -> String {
    let mut out = String::new();
    out.push_str("set -u\n");
    out.push_str(&format!("log={}\n", sh_path(&script.transfer_log)));
    out.push_str("mark() { printf '::step::%s\\n' \"$1\" >> \"$log\"; }\n");

    for action in &script.actions {
        let block = match action {
            Action::Marker(step) => format!("mark {}", step.as_str()),
            Action::CreateDir(p) => format!("mkdir -p -- {} || exit {EXIT_MKDIR_FAILED}", sh_path(p)),
            Action::BulkMove {
                from,
                to,
                verify,
                purge,
            } => {
                let mut flags = String::from("-a --remove-source-files");
                if *verify {
                    flags.push_str(" --checksum");
                }
                if *purge {
                    flags.push_str(" --delete");
                }
                // Trailing slashes copy the contents, not the directory itself.
                format!(
                    "mkdir -p -- {to}\nrsync {flags} --log-file=\"$log\" --log-file-format='%l\t%n' -- {from}/ {to}/\nrc=$?\nif [ \"$rc\" -ne 0 ]; then exit $(({EXIT_COPY_BASE} + rc)); fi",
                    from = sh_path(from),
                    to = sh_path(to),
                )
            }
            Action::Compress(p) => format!(
                "printf 'compression is not available here; skipped %s\\n' {} >&2",
                sh_path(p)
            ),
            Action::RemoveEmptyDir(p) => format!(
                "if [ -e {p} ]; then\n  if [ -n \"$(find {p} ! -type d | head -n 1)\" ]; then exit {EXIT_RMDIR_FAILED}; fi\n  rm -rf -- {p} || exit {EXIT_RMDIR_FAILED}\nfi",
                p = sh_path(p)
            ),
            Action::CreateJunction { link, target } => format!(
                "ln -s -- {} {} || exit {EXIT_LINK_FAILED}",
                sh_path(target),
                sh_path(link)
            ),
            Action::RemoveJunction(p) => format!(
                "[ -L {p} ] || exit {EXIT_UNLINK_FAILED}\nrm -f -- {p} || exit {EXIT_UNLINK_FAILED}",
                p = sh_path(p)
            ),
        };
        out.push_str(&block);
        out.push('\n');
    }
    out.push_str("exit 0\n");
    out
}

/// Base64 of the UTF-8 script body, decoded by `base64 -d` on the far side.
pub fn encode_posix(script: &str) -> String {
    general_purpose::STANDARD.encode(script.as_bytes())
}
