//! CrashWatcher - reports each new core dump exactly once

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::constants::CRASH_EVENT_NAME;
use crate::coredump::{CoreDumpName, CrashAttributeReader, CrashEvent};
use crate::error::{CrashAttributeError, EventLogError, ScanError};
use crate::event_log::EventSink;
use crate::ledger::LedgerStore;

/// What happened to one newly discovered file
#[derive(Debug)]
pub enum FileResult {
    /// Crash event emitted
    Emitted(CrashEvent),
    /// Attributes unreadable; no event, file still recorded
    AttributeReadFailure(CrashAttributeError),
    /// Attributes read but the sink refused the event; file still recorded
    EmitFailure(EventLogError),
}

#[derive(Debug)]
pub struct ProcessedFile {
    pub file: String,
    pub result: FileResult,
}

/// Summary of one scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Matching files found in the directory
    pub discovered: usize,
    /// Of those, files already in the ledger
    pub already_processed: usize,
    /// Newly processed files in discovery order
    pub processed: Vec<ProcessedFile>,
}

impl ScanOutcome {
    pub fn new_files(&self) -> usize {
        self.processed.len()
    }

    pub fn events(&self) -> impl Iterator<Item = &CrashEvent> {
        self.processed.iter().filter_map(|p| match &p.result {
            FileResult::Emitted(event) => Some(event),
            _ => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.processed
            .iter()
            .filter(|p| !matches!(p.result, FileResult::Emitted(_)))
            .count()
    }
}

pub struct CrashWatcher {
    core_dir: PathBuf,
    ledger: Box<dyn LedgerStore>,
    attributes: Box<dyn CrashAttributeReader>,
    sink: Box<dyn EventSink>,
}

impl CrashWatcher {
    pub fn new(
        core_dir: impl Into<PathBuf>,
        ledger: Box<dyn LedgerStore>,
        attributes: Box<dyn CrashAttributeReader>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            core_dir: core_dir.into(),
            ledger,
            attributes,
            sink,
        }
    }

    pub fn core_dir(&self) -> &Path {
        &self.core_dir
    }

    /// Startup pass over dumps left from before the daemon started
    pub fn initial_scan(&mut self) -> Result<ScanOutcome, ScanError> {
        info!("Initial scan of {}", self.core_dir.display());
        self.scan()
    }

    #[instrument(skip(self), fields(dir = %self.core_dir.display()))]
    pub fn scan(&mut self) -> Result<ScanOutcome, ScanError> {
        let files = list_core_files(&self.core_dir).map_err(|source| {
            ScanError::DirectoryIoFailure {
                path: self.core_dir.clone(),
                source,
            }
        })?;

        let mut ledger = self
            .ledger
            .load()
            .map_err(|source| ScanError::LedgerIoFailure {
                operation: "load",
                source,
            })?;

        let mut outcome = ScanOutcome {
            discovered: files.len(),
            ..Default::default()
        };

        let new_files: Vec<_> = files
            .into_iter()
            .filter(|(id, _)| {
                let seen = ledger.contains(id);
                if seen {
                    outcome.already_processed += 1;
                }
                !seen
            })
            .collect();

        if new_files.is_empty() {
            debug!("No new core files");
            return Ok(outcome);
        }

        // Ledger is committed only after every new file had its one attempt
        let mut processed = Vec::with_capacity(new_files.len());
        for (id, path) in new_files {
            let result = self.process_file(&id, &path);
            ledger.insert(id.clone());
            processed.push(ProcessedFile { file: id, result });
        }

        self.ledger
            .persist(&ledger)
            .map_err(|source| ScanError::LedgerIoFailure {
                operation: "persist",
                source,
            })?;

        outcome.processed = processed;
        info!(
            "Processed {} new core files ({} failed)",
            outcome.new_files(),
            outcome.failures()
        );
        Ok(outcome)
    }

    fn process_file(&self, id: &str, path: &Path) -> FileResult {
        let attributes = match self.attributes.read_attributes(path) {
            Ok(attributes) => attributes,
            Err(e) => {
                warn!("Cannot read crash attributes of {}: {}", id, e);
                return FileResult::AttributeReadFailure(e);
            }
        };

        let event = CrashEvent::new(id, attributes);
        match self.sink.log_event(CRASH_EVENT_NAME, &event.event_args()) {
            Ok(()) => {
                info!(
                    process = %event.process,
                    signal = event.signal,
                    "Reported crash from {}",
                    id
                );
                FileResult::Emitted(event)
            }
            Err(e) => {
                warn!("Failed to emit crash event for {}: {}", id, e);
                FileResult::EmitFailure(e)
            }
        }
    }
}

/// Lists core dumps below `dir`, recursively, as (ledger id, path) pairs.
///
/// The id is the path relative to `dir`. Results are sorted by id so scans
/// are deterministic. A missing directory lists as empty. Directories whose
/// names cannot be written as one ledger line are not descended into.
pub fn list_core_files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || is_ledger_safe(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Missing root, or a subdirectory removed mid-walk
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => return Err(e.into()),
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !CoreDumpName::is_match(name) {
            continue;
        }

        let Some(id) = entry
            .path()
            .strip_prefix(dir)
            .ok()
            .and_then(Path::to_str)
            .map(str::to_string)
        else {
            continue;
        };
        found.push((id, entry.into_path()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

fn is_ledger_safe(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| !name.chars().any(char::is_control))
}
