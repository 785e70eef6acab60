//! # supportabilityd - Supportability Daemon
//!
//! Keeps the remote syslog forwarding configuration in sync with CONFIG_DB
//! and reports daemon crashes found in the core dump directory.
//!
//! ## Responsibilities
//! - Render `SYSLOG_REMOTE` rows into `/etc/rsyslog.remote.conf`
//! - Restart rsyslog only when the rendered file actually changed
//! - Raise one `SUPPORTABILITY_DAEMON_CRASH` event per new core dump
//! - Remember reported dumps across restarts in a ledger file
//!
//! ## Event Sources
//! - `SYSLOG_REMOTE` table (CONFIG_DB keyspace notifications)
//! - Core dump directory (inotify, recursive)
//! - Admin control socket (`exit`)

pub mod config;
pub mod config_store;
pub mod control;
pub mod coredump;
pub mod crash_watcher;
pub mod daemon;
pub mod error;
pub mod event_log;
pub mod fs_watch;
pub mod ledger;
pub mod reconciler;
pub mod reloader;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod tables;
mod types;

pub use config::SupportabilityConfig;
pub use config_store::{ConfigStore, MemoryConfigStore, RedisConfigStore};
pub use control::{ControlCommand, ControlServer};
pub use coredump::{signal_name, CrashAttributeReader, CrashAttributes, CrashEvent, XattrReader};
pub use crash_watcher::{CrashWatcher, FileResult, ProcessedFile, ScanOutcome};
pub use daemon::{ConfigChangeError, Daemon, DaemonContext};
pub use error::{
    CrashAttributeError, EventLogError, ReconcileError, ReloadError, ScanError, StoreError,
    SupportabilityError,
};
pub use event_log::{EventCatalog, EventLog, EventSink};
pub use fs_watch::CrashDirWatcher;
pub use ledger::{FileLedger, LedgerStore};
pub use reconciler::{render_config, ConfigReconciler, ReconcileOutcome, ReloadFailurePolicy};
pub use reloader::{ServiceReloader, SystemctlReloader};
pub use tables::*;
pub use types::*;
