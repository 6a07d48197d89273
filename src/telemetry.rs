//! Progress telemetry from the bulk-copy transfer log.
//!
//! The copy step appends to a side-channel log while it runs. A monitor thread
//! re-reads the newly appended bytes on a fixed tick and turns complete lines
//! into step and progress events. Incomplete trailing lines are held back
//! until the next tick; read errors are swallowed and retried.
//!
//! Recognised lines:
//! - `::step::<Step>` markers written by the script.
//! - transfer records: tab-separated, the last field is the path and the field
//!   before it ends in a byte count (robocopy `/BYTES /FP`, rsync
//!   `--log-file-format='%l\t%n'`, and the in-process mover all fit).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, trace, warn};

use crate::model::{MoveStep, Progress};
use crate::script::STEP_MARKER;

/// Default transfer-log poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a single log line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Step(MoveStep),
    Transfer { bytes: u64, path: String },
}

/// Event handed to the job while the copy runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    Step(MoveStep),
    Progress(Progress),
}

/// Parse one complete log line.
pub fn parse_line(line: &str) -> Option<LogLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.trim().strip_prefix(STEP_MARKER) {
        return rest.parse::<MoveStep>().ok().map(LogLine::Step);
    }

    let fields: Vec<&str> = line
        .split('\t')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.len() < 2 {
        return None;
    }
    let path = fields[fields.len() - 1];
    if path.ends_with('/') || path.ends_with('\\') {
        return None;
    }
    let bytes = fields[fields.len() - 2]
        .split_whitespace()
        .last()?
        .parse::<u64>()
        .ok()?;
    // Robocopy lists deletions and unchanged files in the same shape.
    let class = fields[..fields.len() - 2].join(" ").to_ascii_lowercase();
    if class.contains("extra") || class.contains("same") || class.contains("skipped") {
        return None;
    }
    Some(LogLine::Transfer {
        bytes,
        path: path.to_string(),
    })
}

/// File name of the transfer log inside its private directory.
pub const TRANSFER_LOG_NAME: &str = "transfer.log";

/// Private directory holding one run's transfer log.
///
/// Created by the invoking user before anything is elevated: the directory is
/// 0700 and the log 0600 on Unix, and the log already exists, so the script
/// only ever appends to a file this user owns. Dropping (or [`close`]) removes
/// both.
///
/// [`close`]: TransferLogDir::close
#[derive(Debug)]
pub struct TransferLogDir {
    dir: TempDir,
    log: PathBuf,
}

impl TransferLogDir {
    pub fn create() -> io::Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(parent: impl AsRef<Path>) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("junction_mover-")
            .tempdir_in(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
        }
        let log = dir.path().join(TRANSFER_LOG_NAME);
        let mut opts = OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        opts.open(&log)?;
        debug!(path = %log.display(), "transfer log created");
        Ok(Self { dir, log })
    }

    pub fn log_path(&self) -> &Path {
        &self.log
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory, reporting a failure instead of swallowing it.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "could not remove transfer log directory");
        }
    }
}

/// Incremental reader over a log file that another process is appending to.
#[derive(Debug)]
pub struct TransferLogReader {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
    files: u64,
    bytes: u64,
}

impl TransferLogReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
            files: 0,
            bytes: 0,
        }
    }

    pub fn files_seen(&self) -> u64 {
        self.files
    }

    /// Read everything appended since the last call and return the events it produced.
    pub fn poll(&mut self) -> io::Result<Vec<TelemetryEvent>> {
        let mut f = File::open(&self.path)?;
        let len = f.metadata()?.len();
        if len < self.offset {
            // Truncated underneath us; start over.
            self.offset = 0;
            self.pending.clear();
        }
        f.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        let n = f.read_to_end(&mut buf)?;
        self.offset += n as u64;
        if n == 0 {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(&buf);

        let mut events = Vec::new();
        let mut transferred: Option<String> = None;
        // Only complete lines are decoded; a poll may land inside a multibyte character.
        while let Some(idx) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&raw);
            match parse_line(&line) {
                Some(LogLine::Step(step)) => {
                    if let Some(current_file) = transferred.take() {
                        events.push(self.progress(current_file));
                    }
                    events.push(TelemetryEvent::Step(step));
                }
                Some(LogLine::Transfer { bytes, path }) => {
                    self.files += 1;
                    self.bytes = self.bytes.saturating_add(bytes);
                    transferred = Some(path);
                }
                None => trace!(line = line.trim_end(), "ignoring log line"),
            }
        }
        if let Some(current_file) = transferred {
            events.push(self.progress(current_file));
        }
        Ok(events)
    }

    fn progress(&self, current_file: String) -> TelemetryEvent {
        TelemetryEvent::Progress(Progress {
            files_copied: self.files,
            bytes_copied: self.bytes,
            current_file,
        })
    }

    /// Poll once and forward events; errors are expected mid-write and only traced.
    pub fn drain(&mut self, sink: &(dyn Fn(TelemetryEvent) + Sync)) {
        match self.poll() {
            Ok(events) => events.into_iter().for_each(sink),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "transfer log read failed; retrying next tick"),
        }
    }
}

/// Run `work` while a monitor thread tails `log` every `interval`.
///
/// The monitor is stopped, drained one last time and joined before this
/// returns; the log file is then removed.
pub fn observe_while<T>(
    log: &Path,
    interval: Duration,
    sink: &(dyn Fn(TelemetryEvent) + Sync),
    work: impl FnOnce() -> T,
) -> T {
    let out = thread::scope(|s| {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let monitor = s.spawn(move || {
            let mut reader = TransferLogReader::new(log);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => reader.drain(sink),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        reader.drain(sink);
                        break;
                    }
                }
            }
            reader.files_seen()
        });

        let out = work();
        let _ = stop_tx.send(());
        match monitor.join() {
            Ok(files) => debug!(files, "telemetry monitor stopped"),
            Err(_) => debug!("telemetry monitor panicked"),
        }
        out
    });
    if let Err(e) = std::fs::remove_file(log)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %log.display(), error = %e, "could not remove transfer log");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[test]
    fn parses_robocopy_record() {
        let line = "\t    New File  \t\t     1234\tC:\\Users\\me\\AppData\\App\\a.db\r\n";
        assert_eq!(
            parse_line(line),
            Some(LogLine::Transfer {
                bytes: 1234,
                path: "C:\\Users\\me\\AppData\\App\\a.db".into()
            })
        );
    }

    #[test]
    fn parses_rsync_record() {
        let line = "2025/01/02 10:00:00 [4242] 77\tsub/file.txt\n";
        assert_eq!(
            parse_line(line),
            Some(LogLine::Transfer {
                bytes: 77,
                path: "sub/file.txt".into()
            })
        );
    }

    #[test]
    fn ignores_dirs_extras_and_noise() {
        assert_eq!(parse_line("2025/01/02 10:00:00 [1] 4096\tsub/\n"), None);
        assert_eq!(parse_line("\t*EXTRA File\t\t10\tC:\\x\\old.txt\n"), None);
        assert_eq!(parse_line("building file list\n"), None);
        assert_eq!(parse_line("\n"), None);
    }

    #[test]
    fn parses_step_marker() {
        assert_eq!(
            parse_line("::step::ReplaceWithJunction\r\n"),
            Some(LogLine::Step(MoveStep::ReplaceWithJunction))
        );
        assert_eq!(parse_line("::step::Nope\n"), None);
    }

    #[test]
    fn partial_line_waits_for_completion() {
        let td = tempdir().unwrap();
        let log = td.path().join("t.log");
        let mut f = OpenOptions::new().create(true).append(true).open(&log).unwrap();
        write!(f, "\tNew File\t\t10\t/a/one\n\tNew File\t\t5\t/a/tw").unwrap();
        f.flush().unwrap();

        let mut r = TransferLogReader::new(&log);
        let ev = r.poll().unwrap();
        assert_eq!(
            ev,
            vec![TelemetryEvent::Progress(Progress {
                files_copied: 1,
                bytes_copied: 10,
                current_file: "/a/one".into()
            })]
        );

        writeln!(f, "o").unwrap();
        f.flush().unwrap();
        let ev = r.poll().unwrap();
        assert_eq!(
            ev,
            vec![TelemetryEvent::Progress(Progress {
                files_copied: 2,
                bytes_copied: 15,
                current_file: "/a/two".into()
            })]
        );
        assert!(r.poll().unwrap().is_empty());
    }

    #[test]
    fn multibyte_name_split_across_polls_is_decoded_whole() {
        let td = tempdir().unwrap();
        let log = td.path().join("t.log");
        let record = "\tNew File\t\t3\t/a/日本.txt\n".as_bytes();
        let cut = record.iter().position(|&b| b == 0xE6).unwrap() + 1;
        let mut f = OpenOptions::new().create(true).append(true).open(&log).unwrap();
        f.write_all(&record[..cut]).unwrap();
        f.flush().unwrap();

        let mut r = TransferLogReader::new(&log);
        assert!(r.poll().unwrap().is_empty());

        f.write_all(&record[cut..]).unwrap();
        f.flush().unwrap();
        assert_eq!(
            r.poll().unwrap(),
            vec![TelemetryEvent::Progress(Progress {
                files_copied: 1,
                bytes_copied: 3,
                current_file: "/a/日本.txt".into()
            })]
        );
    }

    #[test]
    fn markers_split_progress_batches() {
        let td = tempdir().unwrap();
        let log = td.path().join("t.log");
        std::fs::write(
            &log,
            "::step::MkDir\n::step::BulkCopy\n\tNew File\t\t1\t/x/a\n::step::ReplaceWithJunction\n",
        )
        .unwrap();
        let ev = TransferLogReader::new(&log).poll().unwrap();
        assert_eq!(ev.len(), 4);
        assert_eq!(ev[0], TelemetryEvent::Step(MoveStep::MkDir));
        assert_eq!(ev[1], TelemetryEvent::Step(MoveStep::BulkCopy));
        assert!(matches!(ev[2], TelemetryEvent::Progress(_)));
        assert_eq!(ev[3], TelemetryEvent::Step(MoveStep::ReplaceWithJunction));
    }

    #[test]
    fn log_dir_is_private_and_removed_on_close() {
        let td = tempdir().unwrap();
        let a = TransferLogDir::create_in(td.path()).unwrap();
        let b = TransferLogDir::create_in(td.path()).unwrap();
        assert_ne!(a.log_path(), b.log_path());
        assert!(a.log_path().is_file());
        assert_eq!(a.log_path().parent(), Some(a.path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir_mode = std::fs::metadata(a.path()).unwrap().permissions().mode();
            let log_mode = std::fs::metadata(a.log_path()).unwrap().permissions().mode();
            assert_eq!(dir_mode & 0o777, 0o700);
            assert_eq!(log_mode & 0o077, 0);
        }

        let dir = a.path().to_path_buf();
        a.close();
        assert!(!dir.exists());
        drop(b);
        assert_eq!(std::fs::read_dir(td.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_log_is_swallowed() {
        let td = tempdir().unwrap();
        let mut r = TransferLogReader::new(td.path().join("absent.log"));
        let seen = Mutex::new(0);
        r.drain(&|_| *seen.lock().unwrap() += 1);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn observe_while_joins_drains_and_removes_log() {
        let td = tempdir().unwrap();
        let log = td.path().join("t.log");
        let events = Mutex::new(Vec::new());
        let sink = |e: TelemetryEvent| events.lock().unwrap().push(e);

        let out = observe_while(&log, Duration::from_millis(10), &sink, || {
            let mut f = OpenOptions::new().create(true).append(true).open(&log).unwrap();
            for i in 0..5 {
                writeln!(f, "\tNew File\t\t1\t/src/f{i}").unwrap();
                f.flush().unwrap();
                thread::sleep(Duration::from_millis(15));
            }
            42
        });

        assert_eq!(out, 42);
        assert!(!log.exists());
        let counts: Vec<u64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Progress(p) => Some(p.files_copied),
                _ => None,
            })
            .collect();
        assert_eq!(counts.last(), Some(&5));
        assert!(counts.windows(2).all(|w| w[0] < w[1]));
    }
}
