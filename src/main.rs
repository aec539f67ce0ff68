//! Hayat watchdog process
//!
//! Usage:
//!   hayat [--config <path>] [--verbose] [--check-interval <secs>]
//!         [--no-admin] [--proxy-program <program>] [--json-logs]
//!         [--write-config <path>]
//!
//! Runs until SIGINT or SIGTERM, then stops the proxy and exits with 0.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use hayat::admin::{AdminServer, AdminState, SystemHost};
use hayat::config::WatchdogConfig;
use hayat::health::HttpHealthCheck;
use hayat::logging::{self, LogFormat, LogLevel};
use hayat::probe::SystemProbe;
use hayat::process::CommandLauncher;
use hayat::shutdown::{spawn_signal_listener, ShutdownSignal};
use hayat::supervisor::Supervisor;

/// Keeps a forwarding proxy aligned with a restarting IDE backend
#[derive(Debug, Parser)]
#[command(name = "hayat", version, about)]
struct Args {
    /// JSON configuration file; defaults apply to anything it omits
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Seconds between supervisor ticks
    #[arg(long, value_name = "SECS")]
    check_interval: Option<u64>,

    /// Do not start the admin HTTP server
    #[arg(long)]
    no_admin: bool,

    /// Program used to launch the forwarding proxy
    #[arg(long, value_name = "PROGRAM")]
    proxy_program: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Args {
    /// Command-line flags override the file
    fn apply(&self, config: &mut WatchdogConfig) {
        if self.verbose {
            config.logging.level = LogLevel::Debug;
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }
        if let Some(secs) = self.check_interval {
            config.timing.check_interval_secs = secs;
        }
        if self.no_admin {
            config.admin.enabled = false;
        }
        if let Some(program) = &self.proxy_program {
            config.proxy.program = program.clone();
        }
    }
}

async fn load_config(args: &Args) -> anyhow::Result<WatchdogConfig> {
    let mut config = match &args.config {
        Some(path) => WatchdogConfig::load(path)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => WatchdogConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: WatchdogConfig) -> anyhow::Result<()> {
    tracing::info!(
        backend = %config.backend.process_name,
        proxy = %config.proxy.program,
        primary_port = config.proxy.primary_port(),
        check_interval_secs = config.timing.check_interval_secs,
        "Starting Hayat watchdog"
    );

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());

    let probe = Arc::new(SystemProbe::new(&config.backend, &config.timing)?);
    let launcher = Arc::new(CommandLauncher::new(&config.proxy));
    let health = HttpHealthCheck::new(config.proxy.primary_port(), config.timing.probe_timeout())?;

    let (supervisor, handle) =
        Supervisor::new(&config, probe, launcher, Box::new(health), shutdown.clone());

    let admin_task = if config.admin.enabled {
        let state = AdminState {
            supervisor: handle,
            host: Arc::new(SystemHost::new(&config.backend, &config.admin)),
        };
        let server = AdminServer::new(&config.admin, state)?;
        let admin_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            // The watchdog keeps running without its admin API
            if let Err(e) = server.serve(admin_shutdown).await {
                tracing::error!("Admin server failed: {}", e);
            }
        }))
    } else {
        tracing::info!("Admin server disabled");
        None
    };

    let result = supervisor.run().await;

    shutdown.trigger();
    if let Some(task) = admin_task {
        if let Err(e) = task.await {
            tracing::warn!("Admin server task ended abnormally: {}", e);
        }
    }

    result.context("Supervisor failed")?;
    tracing::info!("Watchdog stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args).await?;

    if let Some(path) = &args.write_config {
        config
            .save(path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;
    if let Some(directory) = log_guard.log_directory() {
        tracing::info!(directory = %directory.display(), "Writing log files");
    }

    run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let args = Args::try_parse_from([
            "hayat",
            "--verbose",
            "--check-interval",
            "30",
            "--no-admin",
            "--write-config",
            "hayat.json",
        ])
        .unwrap();

        let mut config = WatchdogConfig::default();
        args.apply(&mut config);

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.timing.check_interval_secs, 30);
        assert!(!config.admin.enabled);
        assert_eq!(args.write_config, Some(PathBuf::from("hayat.json")));
    }
}
