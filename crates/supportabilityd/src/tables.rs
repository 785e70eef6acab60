//! Table name and path constants for supportabilityd

/// CONFIG_DB SYSLOG_REMOTE table
pub const CFG_SYSLOG_REMOTE_TABLE_NAME: &str = "SYSLOG_REMOTE";

/// Field names used in the SYSLOG_REMOTE table
pub mod fields {
    pub const TRANSPORT: &str = "transport";
    pub const REMOTE_HOST: &str = "remote_host";
    pub const PORT_NUMBER: &str = "port_number";
    pub const SEVERITY: &str = "severity";
}

/// Well-known file locations
pub mod paths {
    /// Forwarder configuration included by rsyslog
    pub const INSTALLED_CONFIG: &str = "/etc/rsyslog.remote.conf";

    /// Scratch location used while rendering
    pub const SCRATCH_CONFIG: &str = "/tmp/rsyslog.remote.conf";

    /// Directory systemd-coredump writes into
    pub const CORE_DUMP_DIR: &str = "/var/lib/systemd/coredump";

    /// Processed crash-dump ledger
    pub const PROCESSED_LEDGER: &str = "/var/lib/systemd/coredump/processed_core_files.cfl";

    /// Admin control socket
    pub const CONTROL_SOCKET: &str = "/var/run/supportabilityd.ctl";

    /// Event catalog
    pub const EVENT_CATALOG: &str = "/etc/openswitch/supportability/ops_events.yaml";

    /// Daemon configuration file
    pub const DAEMON_CONFIG: &str = "/etc/sonic/supportabilityd.conf";
}

/// Special constants
pub mod constants {
    /// Default UDP syslog port
    pub const DEFAULT_UDP_PORT: u16 = 514;

    /// Default TCP syslog port
    pub const DEFAULT_TCP_PORT: u16 = 1470;

    /// Command restarting the log forwarder
    pub const RELOAD_COMMAND: &str = "systemctl restart rsyslog";

    /// Event category owned by this daemon
    pub const EVENT_CATEGORY: &str = "SUPPORTABILITY";

    /// Event raised once per new crash dump
    pub const CRASH_EVENT_NAME: &str = "SUPPORTABILITY_DAEMON_CRASH";

    /// First delay before reopening a lost keyspace subscription
    pub const RESUBSCRIBE_INITIAL_DELAY_MS: u64 = 500;

    /// Upper bound of the resubscribe delay
    pub const RESUBSCRIBE_MAX_DELAY_MS: u64 = 30_000;
}

/// Extended attributes systemd-coredump stores on each dump
pub mod xattrs {
    pub const PROCESS: &str = "user.coredump.comm";
    pub const SIGNAL: &str = "user.coredump.signal";
    pub const TIMESTAMP: &str = "user.coredump.timestamp";
}
