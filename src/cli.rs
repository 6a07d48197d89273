//! CLI definition and parsing.
//!
//! Notes:
//! - --debug is a shorthand for --log-level debug.
//! - Paths are sanitized: surrounding quotes and one trailing separator are
//!   stripped (PowerShell and cmd leave them behind).

use clap::{Args as ClapArgs, Parser, Subcommand, ValueHint};
use std::path::{Path, PathBuf};

use crate::config::types::{Config, ExecutionMode, LogLevel};

/// Relocate application data folders to another volume and leave a junction behind.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Execution mode: native, direct or simulated.
    #[arg(long, global = true, value_parser = parse_mode)]
    pub mode: Option<ExecutionMode>,

    /// Print the config file location and exit.
    #[arg(long)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List candidate folders under a scan root.
    Scan {
        /// Directory to scan (defaults to the configured scan root).
        #[arg(value_hint = ValueHint::DirPath)]
        root: Option<PathBuf>,
        /// Maximum number of folders to list.
        #[arg(long)]
        limit: Option<usize>,
        /// Measure each folder's size (slow on large trees).
        #[arg(long)]
        sizes: bool,
    },
    /// Report whether a path is a junction and where it points.
    Inspect {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Move a folder to the target root and leave a junction in its place.
    Relocate {
        #[arg(value_hint = ValueHint::DirPath)]
        path: PathBuf,
        #[command(flatten)]
        copy: CopyFlags,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Remove a junction and move its data back.
    Restore {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Print the privileged steps and script for a relocation or restore without running it.
    Plan {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
        #[command(flatten)]
        copy: CopyFlags,
        /// Plan a restore instead of a relocation.
        #[arg(long)]
        restore: bool,
    },
}

/// Destination and copy options shared by `relocate` and `plan`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CopyFlags {
    /// Destination root (overrides `target_root` from config).
    #[arg(short = 't', long, value_hint = ValueHint::DirPath)]
    pub target: Option<PathBuf>,
    /// Verify each file after copying.
    #[arg(long, overrides_with = "no_verify")]
    pub verify: bool,
    /// Skip verification even if the config enables it.
    #[arg(long, overrides_with = "verify")]
    pub no_verify: bool,
    /// Delete destination entries that do not exist in the source.
    #[arg(long, overrides_with = "no_purge")]
    pub purge: bool,
    /// Keep destination extras even if the config enables purge.
    #[arg(long, overrides_with = "purge")]
    pub no_purge: bool,
    /// Compress the destination after copying (NTFS only).
    #[arg(long, overrides_with = "no_compress")]
    pub compress: bool,
    /// Leave the destination uncompressed even if the config enables it.
    #[arg(long, overrides_with = "compress")]
    pub no_compress: bool,
}

/// `--x` sets, `--no-x` clears, neither keeps the config value.
fn switch(on: bool, off: bool, current: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => current,
    }
}

fn parse_mode(s: &str) -> Result<ExecutionMode, String> {
    s.parse()
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        let copy = match &self.command {
            Some(Command::Relocate { copy, .. }) | Some(Command::Plan { copy, .. }) => copy,
            Some(Command::Scan { root, limit, .. }) => {
                if let Some(root) = root {
                    cfg.scan_root = Some(sanitize_path(root));
                }
                if let Some(limit) = limit {
                    cfg.scan_limit = *limit;
                }
                return;
            }
            _ => return,
        };
        if let Some(target) = &copy.target {
            cfg.target_root = Some(sanitize_path(target));
        }
        cfg.verify_copy = switch(copy.verify, copy.no_verify, cfg.verify_copy);
        cfg.purge = switch(copy.purge, copy.no_purge, cfg.purge);
        cfg.compression = switch(copy.compress, copy.no_compress, cfg.compression);
    }
}

/// Trim surrounding quotes and a single trailing separator left behind by shell quoting.
pub fn sanitize_path(p: &Path) -> PathBuf {
    let raw = p.to_string_lossy();
    let trimmed = raw.trim();
    let mut inner = if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
    {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.trim_matches(|c| c == '\'' || c == '"').to_string()
    };
    inner.retain(|c| c != '"');

    // Keep "/" and "C:\" intact.
    let is_root = inner.len() == 1 || (inner.len() == 3 && inner.as_bytes()[1] == b':');
    if !is_root && (inner.ends_with('\\') || inner.ends_with('/')) {
        inner.pop();
    }
    PathBuf::from(inner)
}

pub fn parse() -> Args {
    Args::parse()
}
