//! Test doubles for the daemon's collaborators.
//!
//! Shared handles (`Clone`) so a test keeps one copy for assertions while
//! the component under test owns another.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::coredump::{CrashAttributeReader, CrashAttributes};
use crate::error::{CrashAttributeError, EventLogError, ReloadError};
use crate::event_log::EventSink;
use crate::ledger::LedgerStore;
use crate::reloader::ServiceReloader;

/// Reload collaborator with injectable failure and delay
#[derive(Debug, Clone, Default)]
pub struct MockReloader {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let reloader = Self::default();
        reloader.set_failing(true);
        reloader
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of reload attempts, successful or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceReloader for MockReloader {
    async fn reload_forwarder(&self) -> Result<(), ReloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            Err(ReloadError::Other("injected reload failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory ledger with injectable load/persist failures
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<Mutex<BTreeSet<String>>>,
    fail_load: Arc<AtomicBool>,
    fail_persist: Arc<AtomicBool>,
    persists: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ledger = Self::default();
        ledger
            .entries
            .lock()
            .extend(entries.into_iter().map(Into::into));
        ledger
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> BTreeSet<String> {
        self.entries.lock().clone()
    }

    /// Number of successful persists
    pub fn persists(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

impl LedgerStore for MemoryLedger {
    fn load(&self) -> io::Result<BTreeSet<String>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected load failure"));
        }
        Ok(self.entries.lock().clone())
    }

    fn persist(&self, entries: &BTreeSet<String>) -> io::Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected persist failure"));
        }
        *self.entries.lock() = entries.clone();
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Attribute reader serving canned attributes by file name.
///
/// Files without an entry fail with [`CrashAttributeError::Missing`].
#[derive(Debug, Clone, Default)]
pub struct StaticAttributeReader {
    attributes: Arc<Mutex<HashMap<String, CrashAttributes>>>,
}

impl StaticAttributeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_name: impl Into<String>, attributes: CrashAttributes) {
        self.attributes.lock().insert(file_name.into(), attributes);
    }
}

impl CrashAttributeReader for StaticAttributeReader {
    fn read_attributes(&self, path: &Path) -> Result<CrashAttributes, CrashAttributeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.attributes
            .lock()
            .get(&name)
            .cloned()
            .ok_or(CrashAttributeError::Missing {
                name: crate::xattrs::PROCESS,
            })
    }
}

/// One event captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub name: String,
    pub args: Vec<(String, String)>,
}

impl RecordedEvent {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Event sink that records every emission
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn log_event(&self, name: &str, args: &[(&str, String)]) -> Result<(), EventLogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventLogError::EventNotFound(name.to_string()));
        }
        self.events.lock().push(RecordedEvent {
            name: name.to_string(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        Ok(())
    }
}
