//! Configuration file support for supportabilityd
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/sonic/supportabilityd.conf

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use sonic_cfgmgr_common::{defaults, DbId, RedisConfig};

use crate::constants::{EVENT_CATEGORY, RELOAD_COMMAND};
use crate::error::{Result, SupportabilityError};
use crate::paths;
use crate::reconciler::ReloadFailurePolicy;

/// Remote syslog forwarding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyslogConfig {
    /// Forwarder configuration file owned by the daemon
    #[serde(default = "default_installed_config")]
    pub installed_config: PathBuf,

    /// Where new content is rendered before comparison
    #[serde(default = "default_scratch_config")]
    pub scratch_config: PathBuf,

    /// Shell command that restarts the forwarder
    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    /// Handling of the installed file when the restart fails
    #[serde(default)]
    pub reload_failure_policy: ReloadFailurePolicy,
}

/// Crash dump monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashConfig {
    /// Directory watched for core dumps
    #[serde(default = "default_core_dir")]
    pub core_dir: PathBuf,

    /// Processed core file ledger
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

/// Admin control socket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for CONFIG_DB
    #[serde(default = "default_config_db_number")]
    pub config_db_number: u32,
}

/// Event catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    #[serde(default = "default_category")]
    pub category: String,
}

/// Complete supportabilityd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportabilityConfig {
    #[serde(default)]
    pub syslog: SyslogConfig,

    #[serde(default)]
    pub crash: CrashConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

// Default functions
fn default_installed_config() -> PathBuf {
    PathBuf::from(paths::INSTALLED_CONFIG)
}

fn default_scratch_config() -> PathBuf {
    PathBuf::from(paths::SCRATCH_CONFIG)
}

fn default_reload_command() -> String {
    RELOAD_COMMAND.to_string()
}

fn default_core_dir() -> PathBuf {
    PathBuf::from(paths::CORE_DUMP_DIR)
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from(paths::PROCESSED_LEDGER)
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(paths::CONTROL_SOCKET)
}

fn default_redis_host() -> String {
    defaults::REDIS_HOST.to_string()
}

fn default_redis_port() -> u16 {
    defaults::REDIS_PORT
}

fn default_config_db_number() -> u32 {
    DbId::ConfigDb.id()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(paths::EVENT_CATALOG)
}

fn default_category() -> String {
    EVENT_CATEGORY.to_string()
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            installed_config: default_installed_config(),
            scratch_config: default_scratch_config(),
            reload_command: default_reload_command(),
            reload_failure_policy: ReloadFailurePolicy::default(),
        }
    }
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            core_dir: default_core_dir(),
            ledger_file: default_ledger_file(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            config_db_number: default_config_db_number(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            category: default_category(),
        }
    }
}

impl SupportabilityConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SupportabilityError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(SupportabilityError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            SupportabilityError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::new(
            self.database.redis_host.clone(),
            self.database.redis_port,
            self.database.config_db_number,
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("syslog.installed_config", &self.syslog.installed_config),
            ("syslog.scratch_config", &self.syslog.scratch_config),
            ("crash.core_dir", &self.crash.core_dir),
            ("crash.ledger_file", &self.crash.ledger_file),
            ("control.socket_path", &self.control.socket_path),
            ("events.catalog_path", &self.events.catalog_path),
        ];
        for (name, path) in required {
            if path.as_os_str().is_empty() {
                return Err(SupportabilityError::Configuration(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }

        if self.syslog.installed_config == self.syslog.scratch_config {
            return Err(SupportabilityError::Configuration(
                "syslog.scratch_config must differ from syslog.installed_config".to_string(),
            ));
        }

        if self.syslog.reload_command.trim().is_empty() {
            return Err(SupportabilityError::Configuration(
                "syslog.reload_command must not be empty".to_string(),
            ));
        }

        if self.database.redis_port == 0 {
            return Err(SupportabilityError::Configuration(
                "redis_port must be > 0".to_string(),
            ));
        }

        if self.events.category.is_empty() {
            return Err(SupportabilityError::Configuration(
                "events.category must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SupportabilityConfig::default();
        assert_eq!(
            config.syslog.installed_config,
            PathBuf::from("/etc/rsyslog.remote.conf")
        );
        assert_eq!(config.syslog.reload_failure_policy, ReloadFailurePolicy::Keep);
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.database.config_db_number, 4);
        assert_eq!(config.events.category, "SUPPORTABILITY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[syslog]
installed_config = "/tmp/test/rsyslog.remote.conf"
reload_failure_policy = "rollback"

[database]
redis_host = "192.168.1.1"
"#;
        let config: SupportabilityConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.syslog.installed_config,
            PathBuf::from("/tmp/test/rsyslog.remote.conf")
        );
        assert_eq!(
            config.syslog.reload_failure_policy,
            ReloadFailurePolicy::Rollback
        );
        assert_eq!(config.database.redis_host, "192.168.1.1");
        // Unspecified values should use defaults
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.syslog.reload_command, "systemctl restart rsyslog");
    }

    #[test]
    fn test_validate_same_scratch_and_installed() {
        let mut config = SupportabilityConfig::default();
        config.syslog.scratch_config = config.syslog.installed_config.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_path() {
        let mut config = SupportabilityConfig::default();
        config.crash.ledger_file = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("crash.ledger_file"));
    }

    #[test]
    fn test_validate_invalid_redis_port() {
        let mut config = SupportabilityConfig::default();
        config.database.redis_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("supportabilityd.conf");

        let mut config = SupportabilityConfig::default();
        config.syslog.reload_failure_policy = ReloadFailurePolicy::Retry;
        config.save(&path).unwrap();

        let loaded = SupportabilityConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SupportabilityConfig::load_or_default("/nonexistent/path.conf").unwrap();
        assert_eq!(config, SupportabilityConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.conf");
        fs::write(&path, "[syslog\n").unwrap();
        assert!(matches!(
            SupportabilityConfig::load_or_default(&path),
            Err(SupportabilityError::Configuration(_))
        ));
    }

    #[test]
    fn test_redis_config() {
        let config = SupportabilityConfig::default();
        assert_eq!(config.redis_config().uri(), "redis://127.0.0.1:6379/4");
    }
}
