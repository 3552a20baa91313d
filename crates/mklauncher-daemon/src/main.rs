//! Machinekit launcher daemon entry point.
//!
//! Scans the given directories for `launcher.ini` descriptors, then serves
//! the status and command endpoints until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mklauncher_core::{Directories, NodeConfig, ServerSettings};
use mklauncher_daemon::{
    CommandShutdown, DEFAULT_SHUTDOWN_COMMAND, DaemonConfig, FileAnnouncer, server,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Machinekit launcher daemon - start and supervise configured launchers
#[derive(Parser, Debug)]
#[command(name = "mklauncher-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directories scanned recursively for launcher.ini files
    #[arg(required = true, value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Service name announced for both endpoints
    #[arg(short, long, default_value = "Machinekit Launcher")]
    name: String,

    /// Do not append the hostname to the service name
    #[arg(short, long)]
    suppress_host: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Importance file (defaults to `~/.config/mklauncher/importance.ini`)
    #[arg(long, value_name = "PATH")]
    importance_file: Option<PathBuf>,

    /// Command run when a client requests system shutdown
    #[arg(long, value_name = "CMD", default_value = DEFAULT_SHUTDOWN_COMMAND)]
    shutdown_command: String,

    /// Seconds between supervisor polls
    #[arg(long, value_name = "SECS", default_value_t = 0.5, value_parser = parse_seconds)]
    poll_interval: f64,

    /// Seconds between heartbeats, 0 to disable
    #[arg(long, value_name = "SECS", default_value_t = 2.0, value_parser = parse_seconds)]
    ping_interval: f64,

    /// Seconds to wait for loops and children at shutdown
    #[arg(long, value_name = "SECS", default_value_t = 5.0, value_parser = parse_seconds)]
    shutdown_timeout: f64,

    /// Status endpoint port (0 picks a free port)
    #[arg(long, default_value_t = 0)]
    status_port: u16,

    /// Command endpoint port (0 picks a free port)
    #[arg(long, default_value_t = 0)]
    command_port: u16,

    /// Service registry directory (defaults to `$XDG_RUNTIME_DIR/mklauncher/services`)
    #[arg(long, value_name = "PATH")]
    registry_dir: Option<PathBuf>,
}

fn parse_seconds(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))?;
    Ok(secs)
}

/// Set up logging with file output for debugging.
/// In debug builds, also logs to a timestamped file in the temp directory.
fn setup_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mklauncher={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("mklauncher-daemon-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("mklauncher-daemon.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_logging(args.debug);

    // Everything fatal is checked before any socket is opened
    let node = NodeConfig::load(&NodeConfig::default_path())?;
    let shutdown = CommandShutdown::parse(&args.shutdown_command)
        .ok_or("--shutdown-command must not be empty")?;

    let (importance_file, registry_dir) = match (args.importance_file, args.registry_dir) {
        (Some(importance), Some(registry)) => (importance, registry),
        (importance, registry) => {
            let dirs = Directories::new()?;
            (
                importance.unwrap_or(dirs.importance_file),
                registry.unwrap_or(dirs.services),
            )
        }
    };

    let config = DaemonConfig {
        directories: args.dirs,
        name: args.name,
        suppress_host: args.suppress_host,
        node,
        settings: ServerSettings {
            poll_interval: Duration::from_secs_f64(args.poll_interval),
            ping_interval: Duration::from_secs_f64(args.ping_interval),
            shutdown_timeout: Duration::from_secs_f64(args.shutdown_timeout),
        },
        importance_file,
        status_port: args.status_port,
        command_port: args.command_port,
    };

    info!("Starting mklauncher daemon...");

    server::run(
        config,
        Box::new(FileAnnouncer::new(registry_dir)),
        Arc::new(shutdown),
    )
    .await?;

    info!("mklauncher daemon stopped");
    Ok(())
}
