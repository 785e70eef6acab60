//! supportabilityd - Supportability Daemon
//!
//! Entry point for the supportabilityd daemon.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sonic_supportabilityd::{
    paths, ConfigReconciler, ControlServer, CrashDirWatcher, CrashWatcher, Daemon, DaemonContext,
    EventLog, FileLedger, RedisConfigStore, SupportabilityConfig, SystemctlReloader, XattrReader,
};

/// SONiC Supportability Daemon
#[derive(Parser, Debug)]
#[command(name = "supportabilityd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration file
    #[arg(short = 'c', long, default_value = paths::DAEMON_CONFIG)]
    config: PathBuf,

    /// Redis server host
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis server port
    #[arg(long)]
    redis_port: Option<u16>,

    /// Redis database index for CONFIG_DB
    #[arg(long)]
    config_db: Option<u32>,

    /// Admin control socket path
    #[arg(long)]
    control_socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut SupportabilityConfig) {
        if let Some(host) = &self.redis_host {
            config.database.redis_host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.database.redis_port = port;
        }
        if let Some(db) = self.config_db {
            config.database.config_db_number = db;
        }
        if let Some(socket) = &self.control_socket {
            config.control.socket_path = socket.clone();
        }
    }
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = SupportabilityConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let event_log = EventLog::init(&config.events.catalog_path, &config.events.category)
        .context("Event log initialization failed")?;

    let store = RedisConfigStore::connect(config.redis_config())
        .await
        .context("Failed to connect to CONFIG_DB")?;

    let reconciler = ConfigReconciler::new(
        &config.syslog.installed_config,
        &config.syslog.scratch_config,
        Box::new(SystemctlReloader::new(config.syslog.reload_command.clone())),
    )
    .with_policy(config.syslog.reload_failure_policy);

    let watcher = CrashWatcher::new(
        &config.crash.core_dir,
        Box::new(FileLedger::new(&config.crash.ledger_file)),
        Box::new(XattrReader),
        Box::new(event_log),
    );

    let (_dir_watcher, crash_wakeups) = CrashDirWatcher::new(&config.crash.core_dir)
        .context("Failed to watch crash directory")?;

    let control = ControlServer::bind(&config.control.socket_path)
        .context("Failed to bind control socket")?;

    let daemon = Daemon::new(
        DaemonContext::new(Arc::new(store)),
        reconciler,
        watcher,
        control,
        crash_wakeups,
    );

    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("supportabilityd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting supportabilityd (Rust) ---");

    match run(args).await {
        Ok(()) => {
            info!("supportabilityd shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("supportabilityd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
