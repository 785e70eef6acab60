//! Core dump naming, crash metadata and crash events

use chrono::{Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::CrashAttributeError;
use crate::xattrs;

/// Signal names indexed by signal number; index 0 is the placeholder
const SIGNAL_NAMES: [&str; 32] = [
    "Unknown signal",
    "Hangup",
    "Interrupt",
    "Quit",
    "Illegal instruction",
    "Trace/breakpoint trap",
    "Aborted",
    "Bus error",
    "Floating point exception",
    "Killed",
    "User defined signal 1",
    "Segmentation fault",
    "User defined signal 2",
    "Broken pipe",
    "Alarm clock",
    "Terminated",
    "Stack fault",
    "Child exited",
    "Continued",
    "Stopped (signal)",
    "Stopped",
    "Stopped (tty input)",
    "Stopped (tty output)",
    "Urgent I/O condition",
    "CPU time limit exceeded",
    "File size limit exceeded",
    "Virtual timer expired",
    "Profiling timer expired",
    "Window changed",
    "I/O possible",
    "Power failure",
    "Bad system call",
];

/// Maps a signal number to its description.
///
/// Numbers outside the table map to "Unknown signal".
pub fn signal_name(signal: i64) -> &'static str {
    usize::try_from(signal)
        .ok()
        .and_then(|idx| SIGNAL_NAMES.get(idx))
        .copied()
        .unwrap_or(SIGNAL_NAMES[0])
}

/// `<process>.<pid>.<YYYYMMDD>.<HHMMSS>.core.tar.gz`
static DAEMON_CORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<process>[A-Za-z0-9_.\-]+)\.(?P<pid>[0-9]+)\.(?P<date>[0-9]{8})\.(?P<time>[0-9]{6})\.core\.tar\.gz$")
        .expect("Invalid regex pattern")
});

/// `vmcore.<YYYYMMDD>.<HHMMSS>.tar.gz`
static KERNEL_CORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^vmcore\.(?P<date>[0-9]{8})\.(?P<time>[0-9]{6})\.tar\.gz$")
        .expect("Invalid regex pattern")
});

/// Kind of dump a file name denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreDumpKind {
    Daemon { process: String, pid: u32 },
    Kernel,
}

/// A file name recognised as a core dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDumpName {
    pub kind: CoreDumpKind,
    /// `YYYYMMDD` from the name
    pub date: String,
    /// `HHMMSS` from the name
    pub time: String,
}

impl CoreDumpName {
    /// Parses a bare file name; returns `None` for anything that is not a dump
    pub fn parse(file_name: &str) -> Option<Self> {
        if let Some(caps) = DAEMON_CORE_RE.captures(file_name) {
            let pid = caps["pid"].parse().ok()?;
            return Some(Self {
                kind: CoreDumpKind::Daemon {
                    process: caps["process"].to_string(),
                    pid,
                },
                date: caps["date"].to_string(),
                time: caps["time"].to_string(),
            });
        }

        KERNEL_CORE_RE.captures(file_name).map(|caps| Self {
            kind: CoreDumpKind::Kernel,
            date: caps["date"].to_string(),
            time: caps["time"].to_string(),
        })
    }

    pub fn is_match(file_name: &str) -> bool {
        DAEMON_CORE_RE.is_match(file_name) || KERNEL_CORE_RE.is_match(file_name)
    }

    /// Crashed process for daemon dumps
    pub fn process(&self) -> Option<&str> {
        match &self.kind {
            CoreDumpKind::Daemon { process, .. } => Some(process),
            CoreDumpKind::Kernel => None,
        }
    }
}

/// Process name encoded in a daemon dump's file name
pub fn process_from_file_name(path: &Path) -> Option<String> {
    let name = CoreDumpName::parse(path.file_name()?.to_str()?)?;
    name.process().map(str::to_string)
}

/// Crash metadata recorded by systemd-coredump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashAttributes {
    pub process: String,
    pub signal: i64,
    /// Seconds since the epoch
    pub timestamp: i64,
}

/// Reads crash metadata from a dump file
pub trait CrashAttributeReader: Send {
    fn read_attributes(&self, path: &Path) -> Result<CrashAttributes, CrashAttributeError>;
}

/// Reads `user.coredump.*` extended attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct XattrReader;

impl XattrReader {
    fn read_string(path: &Path, name: &'static str) -> Result<String, CrashAttributeError> {
        let raw = xattr::get(path, name)
            .map_err(|source| CrashAttributeError::Io { name, source })?
            .ok_or(CrashAttributeError::Missing { name })?;

        Ok(String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }

    fn read_number(path: &Path, name: &'static str) -> Result<i64, CrashAttributeError> {
        let value = Self::read_string(path, name)?;
        value
            .parse()
            .map_err(|_| CrashAttributeError::Malformed { name, value })
    }
}

impl CrashAttributeReader for XattrReader {
    /// The process name falls back to the one in the file name when the
    /// attribute is unavailable
    fn read_attributes(&self, path: &Path) -> Result<CrashAttributes, CrashAttributeError> {
        let process = match Self::read_string(path, xattrs::PROCESS) {
            Ok(process) => process,
            Err(e) => process_from_file_name(path).ok_or(e)?,
        };

        Ok(CrashAttributes {
            process,
            signal: Self::read_number(path, xattrs::SIGNAL)?,
            timestamp: Self::read_number(path, xattrs::TIMESTAMP)?,
        })
    }
}

/// One crash, ready for emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashEvent {
    /// Ledger identifier of the dump file
    pub file: String,
    pub process: String,
    pub signal: i64,
    pub timestamp: i64,
}

impl CrashEvent {
    pub fn new(file: impl Into<String>, attributes: CrashAttributes) -> Self {
        Self {
            file: file.into(),
            process: attributes.process,
            signal: attributes.signal,
            timestamp: attributes.timestamp,
        }
    }

    pub fn signal_name(&self) -> &'static str {
        signal_name(self.signal)
    }

    /// Local time as `YYYY-MM-DD HH:MM:SS`; the raw number if out of range
    pub fn timestamp_human(&self) -> String {
        match Local.timestamp_opt(self.timestamp, 0).single() {
            Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.timestamp.to_string(),
        }
    }

    /// Placeholder values for the crash event template
    pub fn event_args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("process", self.process.clone()),
            ("signal", self.signal_name().to_string()),
            ("timestamp", self.timestamp_human()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_name_table() {
        assert_eq!(signal_name(0), "Unknown signal");
        assert_eq!(signal_name(6), "Aborted");
        assert_eq!(signal_name(11), "Segmentation fault");
        assert_eq!(signal_name(31), "Bad system call");
    }

    #[test]
    fn test_signal_name_out_of_range() {
        assert_eq!(signal_name(32), "Unknown signal");
        assert_eq!(signal_name(64), "Unknown signal");
        assert_eq!(signal_name(-1), "Unknown signal");
        assert_eq!(signal_name(i64::MAX), "Unknown signal");
    }

    #[test]
    fn test_parse_daemon_core() {
        let name = CoreDumpName::parse("ops-lldpd.1.20160217.100955.core.tar.gz").unwrap();
        assert_eq!(
            name.kind,
            CoreDumpKind::Daemon {
                process: "ops-lldpd".to_string(),
                pid: 1
            }
        );
        assert_eq!(name.date, "20160217");
        assert_eq!(name.time, "100955");
    }

    #[test]
    fn test_parse_kernel_core() {
        let name = CoreDumpName::parse("vmcore.20160122.141235.tar.gz").unwrap();
        assert_eq!(name.kind, CoreDumpKind::Kernel);
        assert_eq!(name.date, "20160122");
    }

    #[test]
    fn test_non_matching_names() {
        for name in [
            "processed_core_files.cfl",
            "dontmatchme.$.20161009.080947.core.tar.gz",
            "dontmatchme2%@.20161009.080947.core.tar.gz",
            "ops-portd.1.2015112.040436.core.tar.gz",
            "ops-portd.1.20151121.040436.core.tar",
            "vmcore.20160122.tar.gz",
            "core.ops-portd.1234.xz",
        ] {
            assert!(!CoreDumpName::is_match(name), "{} should not match", name);
        }
    }

    #[test]
    fn test_crash_event_args() {
        let event = CrashEvent::new(
            "ops-portd.1.20151121.040436.core.tar.gz",
            CrashAttributes {
                process: "ops-portd".to_string(),
                signal: 11,
                timestamp: 1_448_078_676,
            },
        );
        let args = event.event_args();
        assert_eq!(args[0], ("process", "ops-portd".to_string()));
        assert_eq!(args[1], ("signal", "Segmentation fault".to_string()));
        assert_eq!(args[2].0, "timestamp");
        assert_eq!(args[2].1.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn test_xattr_reader_missing_attributes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = XattrReader.read_attributes(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_process_from_file_name() {
        let path = Path::new("/var/diagnostics/coredump/ops-portd.1.20151121.040436.core.tar.gz");
        assert_eq!(process_from_file_name(path), Some("ops-portd".to_string()));
        assert_eq!(
            process_from_file_name(Path::new("vmcore.20160122.141235.tar.gz")),
            None
        );
        assert_eq!(process_from_file_name(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_xattr_reader_falls_back_to_file_name_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ops-portd.1.20151121.040436.core.tar.gz");
        std::fs::write(&path, b"core").unwrap();

        // The process name is recovered, so the first failure is the signal
        let name = match XattrReader.read_attributes(&path).unwrap_err() {
            CrashAttributeError::Io { name, .. }
            | CrashAttributeError::Missing { name }
            | CrashAttributeError::Malformed { name, .. } => name,
        };
        assert_eq!(name, xattrs::SIGNAL);
    }
}
