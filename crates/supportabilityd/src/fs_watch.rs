//! Crash directory watching

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SupportabilityError};

/// Watches the core dump directory recursively.
///
/// Every file moved into or created under the directory produces a wakeup
/// on the returned channel. The channel holds at most one pending wakeup,
/// so a burst of files results in one scan.
pub struct CrashDirWatcher {
    // Dropping the watcher stops notifications
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl CrashDirWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<(Self, mpsc::Receiver<()>)> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::channel(1);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_new_file_event(&event.kind) => {
                    debug!(paths = ?event.paths, "Crash directory event");
                    // Full channel means a wakeup is already pending
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => warn!("Crash directory watch error: {}", e),
            }
        })
        .map_err(SupportabilityError::Watcher)?;

        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(SupportabilityError::Watcher)?;

        info!("Watching {} for core dumps", dir.display());
        Ok((
            Self {
                _watcher: watcher,
                dir,
            },
            rx,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_new_file_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}
