//! Persistent record of processed crash files

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storage for the set of crash files already reported.
///
/// `persist` must replace the stored set atomically: after a crash either
/// the old or the new set is visible, never a mix.
pub trait LedgerStore: Send {
    fn load(&self) -> io::Result<BTreeSet<String>>;
    fn persist(&self, entries: &BTreeSet<String>) -> io::Result<()>;
}

/// Ledger kept as a text file, one identifier per line
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl LedgerStore for FileLedger {
    fn load(&self) -> io::Result<BTreeSet<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_entries(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Ledger {} missing, creating empty one", self.path.display());
                let empty = BTreeSet::new();
                self.persist(&empty)?;
                Ok(empty)
            }
            Err(e) => Err(e),
        }
    }

    fn persist(&self, entries: &BTreeSet<String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            for entry in entries {
                writeln!(file, "{}", entry)?;
            }
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        debug!("Persisted {} ledger entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn parse_entries(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
