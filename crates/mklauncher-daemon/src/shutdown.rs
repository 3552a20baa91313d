//! System shutdown collaborator.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info};

/// Default command used to power off the host
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "systemctl poweroff";

/// Something that can ask the host to shut down
pub trait SystemShutdown: Send + Sync {
    /// Returns false if the request could not be delivered.
    fn request_system_shutdown(&self) -> bool;
}

/// Requests shutdown by spawning a configurable command
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    program: String,
    args: Vec<String>,
}

impl CommandShutdown {
    /// Parse a whitespace-separated command line. Returns `None` if it is empty.
    #[must_use]
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Default for CommandShutdown {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
            args: vec!["poweroff".to_string()],
        }
    }
}

impl SystemShutdown for CommandShutdown {
    fn request_system_shutdown(&self) -> bool {
        // Fire and forget: the child is reaped by the runtime
        match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(_child) => {
                info!("Requested system shutdown via '{}'", self.program);
                true
            }
            Err(e) => {
                error!("Failed to run '{}': {e}", self.program);
                false
            }
        }
    }
}
