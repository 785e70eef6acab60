//! Error types for supportabilityd

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use sonic_cfgmgr_common::CfgMgrError;

/// Forwarder reload failure reported by a [`crate::ServiceReloader`]
#[derive(Error, Debug)]
pub enum ReloadError {
    /// The reload command could not be spawned or exited non-zero
    #[error("Reload command failed: {0}")]
    Command(#[from] CfgMgrError),

    /// Any other collaborator failure
    #[error("Reload failed: {0}")]
    Other(String),
}

/// ConfigReconciler errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Local filesystem operation on the scratch/installed pair failed.
    /// The installed file is left untouched.
    #[error("I/O failure during {operation} of {}: {source}", path.display())]
    IoFailure {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new file is installed but the forwarder did not reload
    #[error("Forwarder reload failed after installing new config: {source}")]
    ReloadFailed {
        #[source]
        source: ReloadError,
    },
}

impl ReconcileError {
    pub fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::IoFailure {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-file crash attribute read failure
#[derive(Error, Debug)]
pub enum CrashAttributeError {
    /// Attribute could not be read from the file
    #[error("Failed to read attribute {name}: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// Attribute is absent
    #[error("Attribute {name} missing")]
    Missing { name: &'static str },

    /// Attribute is present but unparsable
    #[error("Attribute {name} malformed: '{value}'")]
    Malformed { name: &'static str, value: String },
}

/// Event catalog and emission errors
#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("Failed to read event catalog {}: {source}", path.display())]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse event catalog: {0}")]
    CatalogParse(#[from] serde_yaml::Error),

    #[error("Event category '{0}' not found in catalog")]
    CategoryNotFound(String),

    #[error("Event '{0}' not found")]
    EventNotFound(String),
}

/// CrashWatcher errors
#[derive(Error, Debug)]
pub enum ScanError {
    /// Ledger could not be read or persisted; nothing was committed
    #[error("Ledger {operation} failed: {source}")]
    LedgerIoFailure {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// The crash directory could not be listed
    #[error("Failed to list crash directory {}: {source}", path.display())]
    DirectoryIoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Config store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Config store error: {0}")]
    Backend(#[from] CfgMgrError),
}

/// Top-level daemon errors (startup and configuration)
#[derive(Error, Debug)]
pub enum SupportabilityError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Control socket error on {}: {source}", path.display())]
    ControlSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Filesystem watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for daemon-level operations
pub type Result<T> = std::result::Result<T, SupportabilityError>;
