//! mklauncher control CLI
//!
//! Talks to a running `mklauncher-daemon` over its status and command
//! endpoints. Endpoints are taken from `--status`/`--command` or looked up in
//! the service registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mklauncher_core::Directories;
use mklauncher_rpc::{
    COMMAND_SERVICE_TYPE, CommandClient, Container, ContainerType, LAUNCHER_TOPIC, Launcher,
    STATUS_SERVICE_TYPE, StatusClient, discover_services, endpoint_address, find_service,
};

/// How long to wait for an error reply; successful commands are not acknowledged
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for the first full update
const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// mklauncher control CLI
#[derive(Parser)]
#[command(name = "mklauncher")]
#[command(about = "Control a running Machinekit launcher daemon")]
#[command(version)]
#[command(after_help = "\
Examples:
  mklauncher services             List announced daemon endpoints
  mklauncher list                 Show the launcher catalog
  mklauncher start 0              Start launcher 0
  mklauncher write 0 'M2'         Send a line to launcher 0's stdin
  mklauncher importance 2 10      Set launcher 2's importance
  mklauncher --status 127.0.0.1:5600 watch
")]
struct Cli {
    /// Status endpoint address (host:port); looked up in the registry if omitted
    #[arg(long = "status", global = true, value_name = "ADDR")]
    status_addr: Option<String>,

    /// Command endpoint address (host:port); looked up in the registry if omitted
    #[arg(long = "command", global = true, value_name = "ADDR")]
    command_addr: Option<String>,

    /// Service registry directory
    #[arg(long, global = true, value_name = "PATH")]
    registry_dir: Option<PathBuf>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// List announced daemon endpoints
    Services,

    /// Print the launcher catalog
    List,

    /// Stream status updates
    Watch {
        /// Print raw JSON envelopes
        #[arg(long)]
        json: bool,
    },

    /// Check that the daemon answers
    Ping,

    /// Start a launcher
    Start { index: u32 },

    /// Send SIGTERM to a launcher's process group
    Terminate { index: u32 },

    /// Send SIGKILL to a launcher's process group
    Kill { index: u32 },

    /// Write a line to a launcher's stdin
    Write {
        index: u32,
        data: String,
        /// Do not append a newline
        #[arg(short = 'n', long)]
        no_newline: bool,
    },

    /// Set a launcher's importance
    Importance { index: u32, value: i32 },

    /// Ask the daemon host to power off
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let registry = match cli.registry_dir.clone() {
        Some(dir) => dir,
        None => Directories::new()?.services,
    };

    match cli.action {
        Action::Services => run_services(&registry),
        Action::List => {
            let addr = resolve_endpoint(cli.status_addr, &registry, STATUS_SERVICE_TYPE)?;
            run_list(&addr).await
        }
        Action::Watch { json } => {
            let addr = resolve_endpoint(cli.status_addr, &registry, STATUS_SERVICE_TYPE)?;
            run_watch(&addr, json).await
        }
        Action::Ping => {
            let addr = resolve_endpoint(cli.command_addr, &registry, COMMAND_SERVICE_TYPE)?;
            run_ping(&addr).await
        }
        action => {
            let addr = resolve_endpoint(cli.command_addr, &registry, COMMAND_SERVICE_TYPE)?;
            let request = build_request(action)
                .context("Subcommand does not map to a launcher command")?;
            run_command(&addr, &request).await
        }
    }
}

/// Use the explicit address, or the first announced service of `kind`.
fn resolve_endpoint(explicit: Option<String>, registry: &Path, kind: &str) -> Result<String> {
    if let Some(addr) = explicit {
        return Ok(endpoint_address(&addr).to_string());
    }

    let service = find_service(registry, kind)
        .with_context(|| format!("Failed to read service registry {}", registry.display()))?;
    match service {
        Some(service) => Ok(endpoint_address(&service.address).to_string()),
        None => bail!(
            "No '{kind}' service announced in {}.\nIs mklauncher-daemon running?",
            registry.display()
        ),
    }
}

/// Envelope for a launcher command subcommand
fn build_request(action: Action) -> Option<Container> {
    let request = match action {
        Action::Start { index } => Container::with_index(ContainerType::LauncherStart, index),
        Action::Terminate { index } => {
            Container::with_index(ContainerType::LauncherTerminate, index)
        }
        Action::Kill { index } => Container::with_index(ContainerType::LauncherKill, index),
        Action::Write {
            index,
            mut data,
            no_newline,
        } => {
            if !no_newline {
                data.push('\n');
            }
            Container {
                data: Some(data),
                ..Container::with_index(ContainerType::LauncherWriteStdin, index)
            }
        }
        Action::Importance { index, value } => Container {
            launcher: vec![Launcher {
                importance: Some(value),
                ..Launcher::with_index(index)
            }],
            ..Container::new(ContainerType::LauncherSet)
        },
        Action::Shutdown => Container::new(ContainerType::LauncherShutdown),
        Action::Services | Action::List | Action::Watch { .. } | Action::Ping => return None,
    };
    Some(request)
}

fn run_services(registry: &Path) -> Result<()> {
    let services = discover_services(registry)
        .with_context(|| format!("Failed to read service registry {}", registry.display()))?;

    if services.is_empty() {
        println!("No services announced in {}", registry.display());
        return Ok(());
    }

    for service in services {
        println!(
            "{:<12} {:<28} {}  ({})",
            service.kind, service.address, service.name, service.uuid
        );
    }
    Ok(())
}

async fn connect_status(addr: &str) -> Result<StatusClient> {
    let mut status = StatusClient::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to status endpoint {addr}"))?;
    status
        .subscribe(LAUNCHER_TOPIC)
        .await
        .context("Failed to subscribe")?;
    Ok(status)
}

async fn run_list(addr: &str) -> Result<()> {
    let mut status = connect_status(addr).await?;

    loop {
        let (_topic, update) = status
            .recv_timeout(UPDATE_TIMEOUT)
            .await
            .context("No full update received")?;
        if update.kind != ContainerType::FullUpdate {
            continue;
        }

        println!("{:>5}  {:<8}  {:>10}  {:>8}  NAME", "INDEX", "STATE", "IMPORTANCE", "PRIORITY");
        for launcher in &update.launcher {
            println!("{}", format_row(launcher));
        }
        return Ok(());
    }
}

fn format_row(launcher: &Launcher) -> String {
    let state = match (launcher.running, launcher.terminating) {
        (Some(true), Some(true)) => "stopping",
        (Some(true), _) => "running",
        _ => "stopped",
    };
    format!(
        "{:>5}  {:<8}  {:>10}  {:>8}  {}",
        launcher.index,
        state,
        launcher.importance.unwrap_or_default(),
        launcher.priority.unwrap_or_default(),
        launcher.name.as_deref().unwrap_or("")
    )
}

async fn run_watch(addr: &str, json: bool) -> Result<()> {
    let mut status = connect_status(addr).await?;

    loop {
        let (topic, update) = status.recv().await.context("Status stream ended")?;
        if json {
            println!("{}", serde_json::to_string(&update)?);
            continue;
        }

        for launcher in &update.launcher {
            println!("[{topic}] {} {}", update.kind, format_change(launcher));
        }
    }
}

/// One-line summary of the fields set in an update entry
fn format_change(launcher: &Launcher) -> String {
    let mut parts = vec![format!("#{}", launcher.index)];
    if let Some(name) = &launcher.name {
        parts.push(format!("name={name:?}"));
    }
    if let Some(importance) = launcher.importance {
        parts.push(format!("importance={importance}"));
    }
    if let Some(running) = launcher.running {
        parts.push(format!("running={running}"));
    }
    if let Some(terminating) = launcher.terminating {
        parts.push(format!("terminating={terminating}"));
    }
    if let Some(returncode) = launcher.returncode {
        parts.push(format!("returncode={returncode}"));
    }
    if let Some(output) = &launcher.output {
        for line in output {
            parts.push(format!("\n    {:>4}| {}", line.index, line.line));
        }
    }
    parts.join(" ")
}

async fn connect_command(addr: &str) -> Result<CommandClient> {
    CommandClient::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to command endpoint {addr}"))
}

async fn run_ping(addr: &str) -> Result<()> {
    let mut client = connect_command(addr).await?;
    let reply = client
        .request(&Container::new(ContainerType::Ping), REPLY_TIMEOUT)
        .await
        .context("Ping failed")?;

    match reply {
        Some(reply) if reply.kind == ContainerType::PingAcknowledge => {
            println!("Daemon at {addr} is alive");
            Ok(())
        }
        Some(reply) => bail!("Unexpected reply: {}", reply.kind),
        None => bail!("No answer from {addr}"),
    }
}

async fn run_command(addr: &str, request: &Container) -> Result<()> {
    let mut client = connect_command(addr).await?;
    let reply = client
        .request(request, REPLY_TIMEOUT)
        .await
        .with_context(|| format!("{} failed", request.kind))?;

    if let Some(reply) = reply
        && reply.kind == ContainerType::Error
    {
        bail!("{}", reply.note.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mklauncher_rpc::{OutputLine, ServiceDescriptor, service_file};
    use tempfile::TempDir;

    #[test]
    fn test_explicit_endpoint_wins() {
        let dir = TempDir::new().unwrap();
        let addr = resolve_endpoint(
            Some("tcp://10.0.0.2:5600".to_string()),
            dir.path(),
            STATUS_SERVICE_TYPE,
        )
        .unwrap();
        assert_eq!(addr, "10.0.0.2:5600");
    }

    #[test]
    fn test_endpoint_from_registry() {
        let dir = TempDir::new().unwrap();
        let service = ServiceDescriptor {
            name: "Launcher".to_string(),
            kind: COMMAND_SERVICE_TYPE.to_string(),
            uuid: "a42c8c6b".to_string(),
            address: "tcp://127.0.0.1:5601".to_string(),
            port: 5601,
        };
        std::fs::write(
            service_file(dir.path(), &service),
            serde_json::to_vec(&service).unwrap(),
        )
        .unwrap();

        let addr = resolve_endpoint(None, dir.path(), COMMAND_SERVICE_TYPE).unwrap();
        assert_eq!(addr, "127.0.0.1:5601");

        let err = resolve_endpoint(None, dir.path(), STATUS_SERVICE_TYPE).unwrap_err();
        assert!(err.to_string().contains("No 'launcher' service"));
    }

    #[test]
    fn test_write_appends_newline() {
        let request = build_request(Action::Write {
            index: 1,
            data: "M2".to_string(),
            no_newline: false,
        })
        .unwrap();
        assert_eq!(request.kind, ContainerType::LauncherWriteStdin);
        assert_eq!(request.index, Some(1));
        assert_eq!(request.data.as_deref(), Some("M2\n"));
    }

    #[test]
    fn test_importance_request() {
        let request = build_request(Action::Importance { index: 2, value: 10 }).unwrap();
        assert_eq!(request.kind, ContainerType::LauncherSet);
        assert_eq!(request.index, None);
        assert_eq!(request.launcher.len(), 1);
        assert_eq!(request.launcher[0].index, 2);
        assert_eq!(request.launcher[0].importance, Some(10));
    }

    #[test]
    fn test_status_actions_have_no_request() {
        assert!(build_request(Action::List).is_none());
        assert!(build_request(Action::Ping).is_none());
    }

    #[test]
    fn test_format_row() {
        let launcher = Launcher {
            name: Some("Mill".to_string()),
            priority: Some(10),
            importance: Some(3),
            running: Some(true),
            terminating: Some(false),
            ..Launcher::with_index(4)
        };
        let row = format_row(&launcher);
        assert!(row.contains("running"));
        assert!(row.ends_with("Mill"));
    }

    #[test]
    fn test_format_change_lists_set_fields() {
        let launcher = Launcher {
            running: Some(false),
            returncode: Some(-15),
            output: Some(vec![OutputLine {
                index: 0,
                line: "bye".to_string(),
            }]),
            ..Launcher::with_index(0)
        };
        let change = format_change(&launcher);
        assert!(change.starts_with("#0 running=false returncode=-15"));
        assert!(change.contains("| bye"));
        assert!(!change.contains("importance"));
    }
}
