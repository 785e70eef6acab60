//! Common infrastructure for SONiC configuration manager daemons.
//!
//! This crate provides shared functionality for the cfgmgr daemons:
//!
//! - [`shell`]: Shell command execution with captured output
//! - [`config_db`]: CONFIG_DB reads and keyspace subscriptions over Redis
//! - [`types`]: Field-value rows and database identifiers
//! - [`error`]: Error types for cfgmgr operations
//!
//! # Architecture
//!
//! Configuration managers follow this pattern:
//!
//! 1. Subscribe to CONFIG_DB tables for configuration changes
//! 2. Decode table rows into typed configuration
//! 3. Render files / execute shell commands to apply it to the system
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::{shell, error::CfgMgrResult};
//!
//! async fn restart_rsyslog() -> CfgMgrResult<()> {
//!     shell::exec_or_throw("systemctl restart rsyslog").await?;
//!     Ok(())
//! }
//! ```

pub mod config_db;
pub mod error;
pub mod shell;
pub mod types;

// Re-export commonly used items at crate root
pub use config_db::{KeyspaceSubscriber, RedisConfig, RedisDatabase};
pub use error::{CfgMgrError, CfgMgrResult};
pub use types::{defaults, DbId, FieldValue, FieldValues, FieldValuesExt};
