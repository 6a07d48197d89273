//! Unix bridge: POSIX sh behind an elevation prefix (pkexec, sudo, doas).
//!
//! The rendered script is Base64 encoded and decoded on the far side, so the
//! only text on the command line is the Base64 alphabet.

use std::io;
use std::process::Command;
use tracing::debug;

use super::{Elevator, ExecOutput};
use crate::script::{Script, encode_posix, render_posix};

#[derive(Debug, Clone)]
pub struct ShellElevator {
    /// Command prepended to `sh`, e.g. `["pkexec"]`. Empty runs unprivileged.
    pub prefix: Vec<String>,
}

impl ShellElevator {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    /// Program and arguments to spawn.
    pub fn command_line(&self, encoded: &str) -> Vec<String> {
        let mut argv = self.prefix.clone();
        argv.push("sh".into());
        argv.push("-c".into());
        argv.push(format!("printf '%s' '{encoded}' | base64 -d | sh"));
        argv
    }
}

impl Elevator for ShellElevator {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn run_elevated(&self, script: &Script) -> io::Result<ExecOutput> {
        let encoded = encode_posix(&render_posix(script));
        let argv = self.command_line(&encoded);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        debug!(program = %program, "launching shell bridge");
        let out = Command::new(program).args(args).output()?;
        Ok(ExecOutput::from_output(out))
    }
}
