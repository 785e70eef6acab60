//! Dispatch loop
//!
//! One task multiplexes the config store change notification, the admin
//! control socket and the crash directory wakeups. Each handler runs to
//! completion before the next source is polled, so the reconciler and the
//! crash watcher never run concurrently.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config_store::ConfigStore;
use crate::control::{ControlCommand, ControlServer};
use crate::crash_watcher::{CrashWatcher, ScanOutcome};
use crate::error::{ReconcileError, ScanError, StoreError};
use crate::reconciler::{ConfigReconciler, ReconcileOutcome};

/// State shared by the handlers
pub struct DaemonContext {
    pub store: Arc<dyn ConfigStore>,
    /// Sequence number of the last successfully reconciled table state;
    /// `None` until the first pass succeeds
    pub last_seqno: Option<u64>,
    /// Set by the `exit` command; the loop stops after the current handler
    pub exiting: bool,
}

impl DaemonContext {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            last_seqno: None,
            exiting: false,
        }
    }
}

/// Failure of one config-change pass
#[derive(Error, Debug)]
pub enum ConfigChangeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

pub struct Daemon {
    ctx: DaemonContext,
    reconciler: ConfigReconciler,
    watcher: CrashWatcher,
    control: ControlServer,
    crash_wakeups: mpsc::Receiver<()>,
}

impl Daemon {
    pub fn new(
        ctx: DaemonContext,
        reconciler: ConfigReconciler,
        watcher: CrashWatcher,
        control: ControlServer,
        crash_wakeups: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            ctx,
            reconciler,
            watcher,
            control,
            crash_wakeups,
        }
    }

    pub fn context(&self) -> &DaemonContext {
        &self.ctx
    }

    /// Reconciles if the store changed since the last successful pass.
    ///
    /// Returns `Ok(None)` when the sequence number is unchanged.
    pub async fn handle_config_change(
        &mut self,
    ) -> Result<Option<ReconcileOutcome>, ConfigChangeError> {
        let seqno = self.ctx.store.change_seqno();
        if self.ctx.last_seqno == Some(seqno) {
            debug!(seqno, "Config store unchanged");
            return Ok(None);
        }

        let rows = self
            .ctx
            .store
            .read_remote_destinations()
            .await?;

        let outcome = self
            .reconciler
            .reconcile(&rows)
            .await?;

        self.ctx.last_seqno = Some(seqno);
        Ok(Some(outcome))
    }

    pub fn handle_crash_event(&mut self) -> Result<ScanOutcome, ScanError> {
        self.watcher.scan()
    }

    /// Runs until `exit` arrives on the control socket or `shutdown` resolves
    pub async fn run<F>(mut self, shutdown: F) -> DaemonContext
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut changes = self.ctx.store.subscribe();
        changes.borrow_and_update();
        let mut changes_open = true;
        let mut crash_open = true;

        self.config_changed().await;
        match self.watcher.initial_scan() {
            Ok(outcome) => log_scan(&outcome),
            Err(e) => error!("Initial crash scan failed: {}", e),
        }

        info!("supportabilityd dispatch loop started");

        while !self.ctx.exiting {
            // Pending work drains before control commands are served
            tokio::select! {
                biased;

                changed = changes.changed(), if changes_open => match changed {
                    Ok(()) => {
                        changes.borrow_and_update();
                        self.config_changed().await;
                    }
                    Err(_) => {
                        warn!("Config store notifications closed");
                        changes_open = false;
                    }
                },

                wakeup = self.crash_wakeups.recv(), if crash_open => match wakeup {
                    Some(()) => match self.handle_crash_event() {
                        Ok(outcome) => log_scan(&outcome),
                        Err(e) => error!("Crash scan failed: {}", e),
                    },
                    None => {
                        warn!("Crash directory notifications closed");
                        crash_open = false;
                    }
                },

                accepted = self.control.accept() => match accepted {
                    Ok(stream) => {
                        if let Some(ControlCommand::Exit) = ControlServer::serve(stream).await {
                            info!("Exit requested over control socket");
                            self.ctx.exiting = true;
                        }
                    }
                    Err(e) => warn!("Control socket accept failed: {}", e),
                },

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.ctx.exiting = true;
                }
            }
        }

        info!("supportabilityd dispatch loop stopped");
        self.ctx
    }

    async fn config_changed(&mut self) {
        match self.handle_config_change().await {
            Ok(Some(ReconcileOutcome::Reloaded)) => info!("Remote syslog configuration applied"),
            Ok(Some(ReconcileOutcome::ReloadRetried)) => info!("Forwarder reload retried"),
            Ok(Some(ReconcileOutcome::Unchanged)) | Ok(None) => {}
            Err(e) => error!("Remote syslog reconcile failed: {}", e),
        }
    }
}

fn log_scan(outcome: &ScanOutcome) {
    if outcome.new_files() > 0 {
        info!(
            discovered = outcome.discovered,
            new = outcome.new_files(),
            failed = outcome.failures(),
            "Crash scan complete"
        );
    }
}
