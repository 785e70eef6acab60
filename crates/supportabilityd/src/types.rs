//! Type definitions for supportabilityd

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use sonic_cfgmgr_common::{CfgMgrError, CfgMgrResult, FieldValues, FieldValuesExt};

use crate::constants::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use crate::fields;

/// Transport used to reach a remote syslog server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        }
    }

    /// Port used when the row does not carry one
    pub fn default_port(&self) -> u16 {
        match self {
            Transport::Udp => DEFAULT_UDP_PORT,
            Transport::Tcp => DEFAULT_TCP_PORT,
        }
    }

    /// rsyslog forwarding action prefix (`@` for udp, `@@` for tcp)
    pub fn action_prefix(&self) -> &'static str {
        match self {
            Transport::Udp => "@",
            Transport::Tcp => "@@",
        }
    }
}

impl FromStr for Transport {
    type Err = CfgMgrError;

    fn from_str(s: &str) -> CfgMgrResult<Self> {
        match s {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            other => Err(CfgMgrError::invalid_config(
                fields::TRANSPORT,
                format!("unsupported transport '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Syslog severity selector, most to least severe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emerg,
    Alert,
    Crit,
    #[serde(rename = "err")]
    Error,
    Warning,
    Notice,
    Info,
    #[default]
    Debug,
}

impl Severity {
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emerg => "emerg",
            Severity::Alert => "alert",
            Severity::Crit => "crit",
            Severity::Error => "err",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl FromStr for Severity {
    type Err = CfgMgrError;

    fn from_str(s: &str) -> CfgMgrResult<Self> {
        Severity::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| {
                CfgMgrError::invalid_config(
                    fields::SEVERITY,
                    format!("unsupported severity '{}'", s),
                )
            })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the SYSLOG_REMOTE table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteDestination {
    /// Transport protocol
    pub transport: Transport,

    /// Remote server hostname or address
    pub host: String,

    /// Remote server port
    pub port: u16,

    /// Lowest severity forwarded
    pub severity: Severity,
}

impl RemoteDestination {
    /// Creates a UDP destination with default port and severity
    pub fn udp(host: impl Into<String>) -> Self {
        Self {
            transport: Transport::Udp,
            host: host.into(),
            port: DEFAULT_UDP_PORT,
            severity: Severity::default(),
        }
    }

    /// Creates a TCP destination with default port and severity
    pub fn tcp(host: impl Into<String>) -> Self {
        Self {
            transport: Transport::Tcp,
            host: host.into(),
            port: DEFAULT_TCP_PORT,
            severity: Severity::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Decodes a CONFIG_DB row.
    ///
    /// `remote_host` falls back to the row key when the field is absent.
    /// Missing `transport`, `port_number` and `severity` take their defaults;
    /// present but malformed values are rejected.
    pub fn from_field_values(key: &str, values: &FieldValues) -> CfgMgrResult<Self> {
        let host = values
            .get_non_empty(fields::REMOTE_HOST)
            .unwrap_or(key)
            .trim();
        if host.is_empty() {
            return Err(CfgMgrError::invalid_config(
                fields::REMOTE_HOST,
                "remote host is required",
            ));
        }
        // Each row must render as exactly one rule line
        if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CfgMgrError::invalid_config(
                fields::REMOTE_HOST,
                format!("remote host {:?} contains whitespace or control characters", host),
            ));
        }

        let transport = match values.get_non_empty(fields::TRANSPORT) {
            Some(value) => value.parse()?,
            None => Transport::default(),
        };

        let port = match values.get_non_empty(fields::PORT_NUMBER) {
            Some(value) => parse_port(value)?,
            None => transport.default_port(),
        };

        let severity = match values.get_non_empty(fields::SEVERITY) {
            Some(value) => value.parse()?,
            None => Severity::default(),
        };

        Ok(Self {
            transport,
            host: host.to_string(),
            port,
            severity,
        })
    }

    /// Renders the rsyslog forwarding rule for this destination
    pub fn render_line(&self) -> String {
        format!(
            "*.{} {}{}:{}\n",
            self.severity,
            self.transport.action_prefix(),
            self.host,
            self.port
        )
    }
}

fn parse_port(value: &str) -> CfgMgrResult<u16> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(CfgMgrError::invalid_config(
            fields::PORT_NUMBER,
            format!("port '{}' outside 1-65535", value),
        )),
    }
}
