//! Windows bridge: PowerShell with UAC elevation.
//!
//! The rendered script travels as `-EncodedCommand` (Base64 of UTF-16LE), so
//! no path text is ever interpolated into a command line. A hidden outer
//! PowerShell starts the elevated one with `-Verb RunAs -Wait -PassThru` and
//! exits with its exit code; a declined prompt throws and maps to 1223.

use std::io;
use std::process::Command;
use tracing::debug;

use super::{Elevator, ExecOutput};
use crate::script::{EXIT_ELEVATION_DECLINED, Script, encode_powershell, render_powershell};

#[derive(Debug, Clone, Default)]
pub struct PowerShellElevator {
    /// Process is already elevated: run the script directly, no UAC prompt.
    pub already_elevated: bool,
}

impl PowerShellElevator {
    pub fn new(already_elevated: bool) -> Self {
        Self { already_elevated }
    }

    /// Arguments for `powershell.exe`.
    pub fn launcher_args(&self, encoded: &str) -> Vec<String> {
        if self.already_elevated {
            return vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-EncodedCommand".into(),
                encoded.into(),
            ];
        }
        let inner = format!(
            "try {{ $p = Start-Process powershell -Verb RunAs -Wait -PassThru -WindowStyle Hidden -ArgumentList '-NoProfile -ExecutionPolicy Bypass -EncodedCommand {encoded}' -ErrorAction Stop; exit $p.ExitCode }} catch {{ exit {EXIT_ELEVATION_DECLINED} }}"
        );
        vec![
            "-NoProfile".into(),
            "-WindowStyle".into(),
            "Hidden".into(),
            "-Command".into(),
            inner,
        ]
    }
}

impl Elevator for PowerShellElevator {
    fn name(&self) -> &'static str {
        "powershell"
    }

    fn run_elevated(&self, script: &Script) -> io::Result<ExecOutput> {
        let body = render_powershell(script);
        let encoded = encode_powershell(&body);
        debug!(bytes = body.len(), elevated = self.already_elevated, "launching powershell");
        let out = Command::new("powershell")
            .args(self.launcher_args(&encoded))
            .output()?;
        Ok(ExecOutput::from_output(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_once_and_propagates_exit_code() {
        let args = PowerShellElevator::new(false).launcher_args("QUJD");
        let cmd = args.last().unwrap();
        assert_eq!(cmd.matches("-Verb RunAs").count(), 1);
        assert!(cmd.contains("-Wait -PassThru"));
        assert!(cmd.contains("exit $p.ExitCode"));
        assert!(cmd.contains("catch { exit 1223 }"));
        assert!(cmd.contains("-EncodedCommand QUJD"));
    }

    #[test]
    fn elevated_process_runs_script_directly() {
        let args = PowerShellElevator::new(true).launcher_args("QUJD");
        assert!(!args.iter().any(|a| a.contains("RunAs")));
        assert_eq!(args.last().map(String::as_str), Some("QUJD"));
    }
}
