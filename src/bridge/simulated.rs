//! Demo bridge: walks through the plan without changing anything on disk.
//!
//! Step markers and a handful of transfer records (taken from a read-only
//! listing of the source) are still written to the transfer log, so progress
//! reporting behaves as it would for a real run.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use tracing::info;
use walkdir::WalkDir;

use super::{Elevator, ExecOutput, open_transfer_log};
use crate::script::{Action, EXIT_OK, STEP_MARKER, Script};
use crate::utils::io_error_with_help_io;

/// Files reported per simulated bulk move.
const SAMPLE_FILES: usize = 20;

#[derive(Debug, Clone)]
pub struct SimulatedElevator {
    /// Pause per action.
    pub pace: Duration,
}

impl Default for SimulatedElevator {
    fn default() -> Self {
        Self {
            pace: Duration::from_millis(800),
        }
    }
}

impl SimulatedElevator {
    pub fn with_pace(pace: Duration) -> Self {
        Self { pace }
    }
}

impl Elevator for SimulatedElevator {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_native(&self) -> bool {
        false
    }

    fn run_elevated(&self, script: &Script) -> io::Result<ExecOutput> {
        let mut log = open_transfer_log(&script.transfer_log)
            .map_err(io_error_with_help_io("open transfer log", &script.transfer_log))?;
        let mut stdout = String::new();

        for action in &script.actions {
            match action {
                Action::Marker(step) => {
                    log.write_all(format!("{STEP_MARKER}{step}\n").as_bytes())?;
                    continue;
                }
                Action::BulkMove { from, .. } => {
                    let sample: Vec<_> = WalkDir::new(from)
                        .min_depth(1)
                        .into_iter()
                        .filter_map(Result::ok)
                        .filter(|e| e.file_type().is_file())
                        .take(SAMPLE_FILES)
                        .collect();
                    let tick = self.pace / (sample.len().max(1) as u32);
                    for e in sample {
                        let len = e.metadata().map(|m| m.len()).unwrap_or(0);
                        log.write_all(
                            format!("\tNew File\t\t{len}\t{}\n", e.path().display()).as_bytes(),
                        )?;
                        thread::sleep(tick);
                    }
                }
                _ => thread::sleep(self.pace),
            }
            if let Some(cmd) = action.describe() {
                info!(command = %cmd, "simulated");
                stdout.push_str(&format!("(simulated) {cmd}\n"));
            }
        }

        Ok(ExecOutput {
            exit_code: EXIT_OK,
            stdout,
            stderr: String::new(),
        })
    }
}
