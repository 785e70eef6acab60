//! ConfigReconciler
//!
//! Keeps the installed forwarder configuration matching the SYSLOG_REMOTE
//! table.
//!
//! Each call renders the rows into a scratch file, compares it byte-for-byte
//! with the installed file and, only when they differ, swaps the new file
//! into place and restarts the forwarder. The installed file is replaced by
//! copying into a sibling staging file and renaming it over the target, so
//! the live file is never partially written even when the scratch location
//! sits on another filesystem.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ReconcileError;
use crate::reloader::ServiceReloader;
use crate::types::RemoteDestination;

/// What to do with the installed file when the forwarder reload fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadFailurePolicy {
    /// Keep the new file; the reload is not retried
    #[default]
    Keep,
    /// Restore the previous file so the next cycle sees a diff again
    Rollback,
    /// Keep the new file and reload again on the next cycle
    Retry,
}

/// Result of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Rendered config matches the installed file; nothing was done
    Unchanged,
    /// New config installed and the forwarder reloaded
    Reloaded,
    /// Content unchanged, but a previously failed reload succeeded
    ReloadRetried,
}

/// Renders the forwarder configuration, one line per row in row order
pub fn render_config(rows: &[RemoteDestination]) -> String {
    rows.iter().map(RemoteDestination::render_line).collect()
}

/// Reconciles the SYSLOG_REMOTE table into the rsyslog remote config file
pub struct ConfigReconciler {
    installed_path: PathBuf,
    scratch_path: PathBuf,
    reloader: Box<dyn ServiceReloader>,
    policy: ReloadFailurePolicy,
    /// Set under [`ReloadFailurePolicy::Retry`] after a failed reload
    reload_pending: bool,
}

impl ConfigReconciler {
    pub fn new(
        installed_path: impl Into<PathBuf>,
        scratch_path: impl Into<PathBuf>,
        reloader: Box<dyn ServiceReloader>,
    ) -> Self {
        Self {
            installed_path: installed_path.into(),
            scratch_path: scratch_path.into(),
            reloader,
            policy: ReloadFailurePolicy::default(),
            reload_pending: false,
        }
    }

    pub fn with_policy(mut self, policy: ReloadFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn installed_path(&self) -> &Path {
        &self.installed_path
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    pub fn policy(&self) -> ReloadFailurePolicy {
        self.policy
    }

    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    /// Brings the installed file in sync with `rows`.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn reconcile(
        &mut self,
        rows: &[RemoteDestination],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let rendered = render_config(rows);

        fs::write(&self.scratch_path, rendered.as_bytes())
            .map_err(|e| ReconcileError::io("write", &self.scratch_path, e))?;

        let previous = match fs::read(&self.installed_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                self.discard_scratch();
                return Err(ReconcileError::io("read", &self.installed_path, e));
            }
        };

        if previous.as_deref() == Some(rendered.as_bytes()) {
            self.discard_scratch();

            if self.reload_pending {
                info!("Retrying forwarder reload for unchanged config");
                self.reloader
                    .reload_forwarder()
                    .await
                    .map_err(|source| ReconcileError::ReloadFailed { source })?;
                self.reload_pending = false;
                return Ok(ReconcileOutcome::ReloadRetried);
            }

            debug!("Syslog remote configuration unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let installed = install_file(&self.scratch_path, &self.installed_path);
        self.discard_scratch();
        installed.map_err(|e| ReconcileError::io("install", &self.installed_path, e))?;

        info!(path = %self.installed_path.display(), "Syslog remote configuration updated");

        match self.reloader.reload_forwarder().await {
            Ok(()) => {
                self.reload_pending = false;
                Ok(ReconcileOutcome::Reloaded)
            }
            Err(source) => {
                error!(error = %source, policy = ?self.policy, "Forwarder reload failed");
                self.apply_failure_policy(previous.as_deref());
                Err(ReconcileError::ReloadFailed { source })
            }
        }
    }

    fn apply_failure_policy(&mut self, previous: Option<&[u8]>) {
        match self.policy {
            ReloadFailurePolicy::Keep => {}
            ReloadFailurePolicy::Retry => self.reload_pending = true,
            ReloadFailurePolicy::Rollback => {
                let restored = match previous {
                    Some(content) => write_atomically(&self.installed_path, content),
                    None => fs::remove_file(&self.installed_path),
                };
                match restored {
                    Ok(()) => info!("Rolled back syslog remote configuration"),
                    Err(e) => error!(error = %e, "Rollback of syslog remote configuration failed"),
                }
            }
        }
    }

    fn discard_scratch(&self) {
        if let Err(e) = fs::remove_file(&self.scratch_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.scratch_path.display(), error = %e, "Failed to remove scratch config");
            }
        }
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".new");
    target.with_file_name(name)
}

/// Copies `source` next to `target` and renames it into place
fn install_file(source: &Path, target: &Path) -> io::Result<()> {
    let staging = staging_path(target);
    if let Err(e) = fs::copy(source, &staging).and_then(|_| fs::rename(&staging, target)) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

fn write_atomically(target: &Path, content: &[u8]) -> io::Result<()> {
    let staging = staging_path(target);
    if let Err(e) = fs::write(&staging, content).and_then(|_| fs::rename(&staging, target)) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReloader;
    use crate::types::Severity;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn reconciler(dir: &TempDir, reloader: MockReloader) -> ConfigReconciler {
        ConfigReconciler::new(
            dir.path().join("rsyslog.remote.conf"),
            dir.path().join("scratch.conf"),
            Box::new(reloader),
        )
    }

    #[test]
    fn test_render_config_order() {
        let rows = vec![
            RemoteDestination::udp("10.0.0.8"),
            RemoteDestination::tcp("10.0.0.10").with_port(10942),
            RemoteDestination::udp("10.0.0.3").with_severity(Severity::Warning),
        ];
        assert_eq!(
            render_config(&rows),
            "*.debug @10.0.0.8:514\n*.debug @@10.0.0.10:10942\n*.warning @10.0.0.3:514\n"
        );
        assert_eq!(render_config(&[]), "");
    }

    #[tokio::test]
    async fn test_first_reconcile_installs_and_reloads() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::new();
        let mut mgr = reconciler(&dir, reloader.clone());

        let outcome = mgr
            .reconcile(&[RemoteDestination::udp("10.0.0.8")])
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Reloaded);
        assert_eq!(reloader.calls(), 1);
        assert_eq!(
            fs::read_to_string(mgr.installed_path()).unwrap(),
            "*.debug @10.0.0.8:514\n"
        );
        assert!(!mgr.scratch_path().exists());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::new();
        let mut mgr = reconciler(&dir, reloader.clone());
        let rows = vec![RemoteDestination::tcp("10.0.0.10").with_port(10942)];

        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::Reloaded);
        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::Unchanged);
        assert_eq!(reloader.calls(), 1);
        assert!(!mgr.scratch_path().exists());
    }

    #[tokio::test]
    async fn test_row_order_change_triggers_reload() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::new();
        let mut mgr = reconciler(&dir, reloader.clone());
        let a = RemoteDestination::udp("10.0.0.1");
        let b = RemoteDestination::udp("10.0.0.2");

        mgr.reconcile(&[a.clone(), b.clone()]).await.unwrap();
        let outcome = mgr.reconcile(&[b, a]).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Reloaded);
        assert_eq!(reloader.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_table_with_no_installed_file_installs_empty_config() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::new();
        let mut mgr = reconciler(&dir, reloader.clone());

        assert_eq!(mgr.reconcile(&[]).await.unwrap(), ReconcileOutcome::Reloaded);
        assert_eq!(fs::read_to_string(mgr.installed_path()).unwrap(), "");
        assert_eq!(mgr.reconcile(&[]).await.unwrap(), ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_scratch_write_failure_leaves_installed_untouched() {
        let dir = TempDir::new().unwrap();
        let installed = dir.path().join("rsyslog.remote.conf");
        fs::write(&installed, "*.debug @10.0.0.1:514\n").unwrap();

        let reloader = MockReloader::new();
        let mut mgr = ConfigReconciler::new(
            &installed,
            dir.path().join("missing-dir").join("scratch.conf"),
            Box::new(reloader.clone()),
        );

        let err = mgr
            .reconcile(&[RemoteDestination::udp("10.0.0.2")])
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::IoFailure { operation: "write", .. }));
        assert_eq!(fs::read_to_string(&installed).unwrap(), "*.debug @10.0.0.1:514\n");
        assert_eq!(reloader.calls(), 0);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_new_file_and_does_not_retry() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::failing();
        let mut mgr = reconciler(&dir, reloader.clone());
        let rows = vec![RemoteDestination::udp("10.0.0.8")];

        let err = mgr.reconcile(&rows).await.unwrap_err();
        assert!(matches!(err, ReconcileError::ReloadFailed { .. }));
        assert_eq!(
            fs::read_to_string(mgr.installed_path()).unwrap(),
            "*.debug @10.0.0.8:514\n"
        );

        reloader.set_failing(false);
        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::Unchanged);
        assert_eq!(reloader.calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_rollback_restores_previous() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::new();
        let mut mgr = reconciler(&dir, reloader.clone()).with_policy(ReloadFailurePolicy::Rollback);

        mgr.reconcile(&[RemoteDestination::udp("10.0.0.1")]).await.unwrap();

        reloader.set_failing(true);
        let rows = vec![RemoteDestination::udp("10.0.0.2")];
        assert!(mgr.reconcile(&rows).await.is_err());
        assert_eq!(
            fs::read_to_string(mgr.installed_path()).unwrap(),
            "*.debug @10.0.0.1:514\n"
        );

        reloader.set_failing(false);
        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::Reloaded);
        assert_eq!(reloader.calls(), 3);
    }

    #[tokio::test]
    async fn test_reload_failure_rollback_removes_file_when_none_existed() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::failing();
        let mut mgr = reconciler(&dir, reloader).with_policy(ReloadFailurePolicy::Rollback);

        assert!(mgr.reconcile(&[RemoteDestination::udp("10.0.0.1")]).await.is_err());
        assert!(!mgr.installed_path().exists());
    }

    #[tokio::test]
    async fn test_reload_failure_retry_policy() {
        let dir = TempDir::new().unwrap();
        let reloader = MockReloader::failing();
        let mut mgr = reconciler(&dir, reloader.clone()).with_policy(ReloadFailurePolicy::Retry);
        let rows = vec![RemoteDestination::udp("10.0.0.1")];

        assert!(mgr.reconcile(&rows).await.is_err());
        assert!(mgr.reload_pending());

        reloader.set_failing(false);
        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::ReloadRetried);
        assert!(!mgr.reload_pending());
        assert_eq!(mgr.reconcile(&rows).await.unwrap(), ReconcileOutcome::Unchanged);
        assert_eq!(reloader.calls(), 2);
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/etc/rsyslog.remote.conf")),
            PathBuf::from("/etc/rsyslog.remote.conf.new")
        );
    }
}
