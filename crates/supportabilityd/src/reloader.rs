//! Log forwarder reload collaborator

use async_trait::async_trait;
use tracing::{info, instrument};

use sonic_cfgmgr_common::shell;

use crate::constants::RELOAD_COMMAND;
use crate::error::ReloadError;

/// Signals the log forwarder to pick up a new configuration.
///
/// Invoked synchronously from the dispatch loop; a hang here stalls the
/// loop, no timeout is applied.
#[async_trait]
pub trait ServiceReloader: Send + Sync {
    async fn reload_forwarder(&self) -> Result<(), ReloadError>;
}

/// Restarts the forwarder through a shell command
#[derive(Debug, Clone)]
pub struct SystemctlReloader {
    command: String,
}

impl SystemctlReloader {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for SystemctlReloader {
    fn default() -> Self {
        Self::new(RELOAD_COMMAND)
    }
}

#[async_trait]
impl ServiceReloader for SystemctlReloader {
    #[instrument(skip(self), fields(command = %self.command))]
    async fn reload_forwarder(&self) -> Result<(), ReloadError> {
        shell::exec_or_throw(&self.command).await?;
        info!("Log forwarder restarted");
        Ok(())
    }
}
