//! Command handlers for the command channel.
//!
//! One handler per request type. Successful launcher commands produce no
//! reply; their effect shows up on the status channel. Every failure becomes
//! an `ERROR` reply.

use mklauncher_core::{ImportanceStore, LauncherRecord, ProcessSupervisor};
use mklauncher_rpc::{Container, ContainerType, decode_container};
use tracing::{debug, error, info, warn};

use crate::error::CommandError;
use crate::shutdown::SystemShutdown;

type CommandResult = std::result::Result<Option<Container>, CommandError>;

pub struct HandlerContext<'a> {
    pub records: &'a mut [LauncherRecord],
    pub supervisor: &'a mut ProcessSupervisor,
    pub importance: &'a mut ImportanceStore,
    pub shutdown: &'a dyn SystemShutdown,
}

impl HandlerContext<'_> {
    /// Supervisor plus the record addressed by `index`
    fn target(
        &mut self,
        index: Option<u32>,
    ) -> Result<(&mut ProcessSupervisor, &mut LauncherRecord), CommandError> {
        let index = index.ok_or(CommandError::WrongParameters)?;
        let record = self
            .records
            .get_mut(index as usize)
            .ok_or(CommandError::WrongIndex)?;
        Ok((&mut *self.supervisor, record))
    }
}

/// Decode an envelope frame and dispatch it. Returns the reply, if any.
pub fn handle_frame(ctx: &mut HandlerContext<'_>, frame: &[u8]) -> Option<Container> {
    match decode_container(frame) {
        Ok(container) => handle_command(ctx, &container),
        Err(e) => {
            warn!("Undecodable command: {e}");
            Some(CommandError::Decode(e.to_string()).into())
        }
    }
}

/// Dispatch a decoded command. Returns the reply, if any.
pub fn handle_command(ctx: &mut HandlerContext<'_>, container: &Container) -> Option<Container> {
    debug!("Command {} index={:?}", container.kind, container.index);

    let result = match &container.kind {
        ContainerType::Ping => Ok(Some(Container::new(ContainerType::PingAcknowledge))),
        ContainerType::LauncherStart => handle_start(ctx, container),
        ContainerType::LauncherTerminate => handle_terminate(ctx, container),
        ContainerType::LauncherKill => handle_kill(ctx, container),
        ContainerType::LauncherWriteStdin => handle_write_stdin(ctx, container),
        ContainerType::LauncherCall => Err(CommandError::CallNotAllowed),
        ContainerType::LauncherShutdown => handle_shutdown(ctx),
        ContainerType::LauncherSet => handle_set(ctx, container),
        other => {
            debug!("Unknown command type {other}");
            Err(CommandError::UnknownCommand)
        }
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            debug!("Command {} failed: {err}", container.kind);
            Some(err.into())
        }
    }
}

fn handle_start(ctx: &mut HandlerContext<'_>, container: &Container) -> CommandResult {
    let (supervisor, record) = ctx.target(container.index)?;
    supervisor.start(record)?;
    Ok(None)
}

fn handle_terminate(ctx: &mut HandlerContext<'_>, container: &Container) -> CommandResult {
    let (supervisor, record) = ctx.target(container.index)?;
    supervisor.terminate(record)?;
    Ok(None)
}

fn handle_kill(ctx: &mut HandlerContext<'_>, container: &Container) -> CommandResult {
    let (supervisor, record) = ctx.target(container.index)?;
    supervisor.kill(record)?;
    Ok(None)
}

fn handle_write_stdin(ctx: &mut HandlerContext<'_>, container: &Container) -> CommandResult {
    let index = container.index.ok_or(CommandError::WrongParameters)?;
    let data = container
        .data
        .as_ref()
        .ok_or(CommandError::WrongParameters)?;

    if index as usize >= ctx.records.len() || !ctx.supervisor.is_running(index) {
        return Err(CommandError::WrongIndex);
    }
    if !ctx.supervisor.write_stdin(index, data.clone().into_bytes()) {
        return Err(CommandError::WrongIndex);
    }
    Ok(None)
}

fn handle_shutdown(ctx: &HandlerContext<'_>) -> CommandResult {
    info!("System shutdown requested");
    if ctx.shutdown.request_system_shutdown() {
        Ok(None)
    } else {
        Err(CommandError::ShutdownFailed)
    }
}

fn handle_set(ctx: &mut HandlerContext<'_>, container: &Container) -> CommandResult {
    let mut notes = Vec::new();
    let mut changed = false;

    for entry in &container.launcher {
        let Some(importance) = entry.importance else {
            notes.push(CommandError::WrongParameters.to_string());
            continue;
        };
        let Some(record) = ctx.records.get_mut(entry.index as usize) else {
            notes.push(CommandError::WrongIndex.to_string());
            continue;
        };

        record.status.importance = importance;
        ctx.importance.set(record.id.clone(), importance);
        changed = true;
        debug!("[{}] importance set to {importance}", record.index);
    }

    if container.launcher.is_empty() {
        notes.push(CommandError::WrongParameters.to_string());
    }

    if changed && let Err(e) = ctx.importance.save() {
        error!(
            "Failed to persist importance to {}: {e}",
            ctx.importance.path().display()
        );
    }

    if notes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Container::error(notes)))
    }
}
