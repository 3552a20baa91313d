//! Process supervision for launchers.
//!
//! One [`ProcessHandle`] per running launcher, keyed by launcher index. All
//! operations are non-blocking: output is captured by background reader tasks
//! and moved into the records by [`ProcessSupervisor::poll`].

mod process;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::record::LauncherRecord;
use crate::{Error, Result};

pub use process::{ProcessHandle, ProcessState};

/// Poll ticks an exited handle may linger waiting for its output to drain
const MAX_DRAIN_TICKS: u32 = 10;

#[derive(Default)]
pub struct ProcessSupervisor {
    processes: HashMap<u32, ProcessHandle>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a process for `index` is running or terminating
    #[must_use]
    pub fn is_running(&self, index: u32) -> bool {
        self.processes
            .get(&index)
            .is_some_and(ProcessHandle::is_alive)
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.processes.values().filter(|h| h.is_alive()).count()
    }

    /// Spawn the launcher's command.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyRunning` if a process for this launcher is alive,
    /// or `Error::Process` if spawning fails. The record is untouched on error.
    pub fn start(&mut self, record: &mut LauncherRecord) -> Result<()> {
        if self.is_running(record.index) {
            return Err(Error::AlreadyRunning(record.index));
        }

        let handle = ProcessHandle::spawn(record)?;
        // Replaces any exited handle still draining
        self.processes.insert(record.index, handle);

        record.status.reset_output();
        record.status.running = true;
        record.status.terminating = false;

        info!("[{}] Started '{}'", record.index, record.name);
        Ok(())
    }

    /// Send SIGTERM to the launcher's process group.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` if no process is alive for the launcher.
    pub fn terminate(&mut self, record: &mut LauncherRecord) -> Result<()> {
        self.signal(record, libc::SIGTERM)
    }

    /// Send SIGKILL to the launcher's process group.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotRunning` if no process is alive for the launcher.
    pub fn kill(&mut self, record: &mut LauncherRecord) -> Result<()> {
        self.signal(record, libc::SIGKILL)
    }

    fn signal(&mut self, record: &mut LauncherRecord, signal: libc::c_int) -> Result<()> {
        let handle = self
            .processes
            .get_mut(&record.index)
            .filter(|h| h.is_alive())
            .ok_or(Error::NotRunning(record.index))?;

        handle.signal(signal)?;
        record.status.terminating = true;
        info!("[{}] Sent signal {signal} to '{}'", record.index, record.name);
        Ok(())
    }

    /// Forward bytes to the launcher's stdin. Returns false if it is not running.
    pub fn write_stdin(&self, index: u32, bytes: Vec<u8>) -> bool {
        self.processes
            .get(&index)
            .is_some_and(|h| h.write_stdin(bytes))
    }

    /// Drain captured output and detect exits, updating `records`.
    pub fn poll(&mut self, records: &mut [LauncherRecord]) {
        let mut finished = Vec::new();

        for (&index, handle) in &mut self.processes {
            let Some(record) = records.get_mut(index as usize) else {
                warn!("[{index}] No record for supervised process");
                continue;
            };

            let drained = handle.drain_output(&mut record.status);

            if handle.is_alive() {
                if let Some(code) = handle.try_exit() {
                    // Pick up anything written between the drain and the exit
                    let drained = handle.drain_output(&mut record.status) || drained;
                    record.status.running = false;
                    record.status.terminating = false;
                    record.status.returncode = code;
                    info!("[{index}] '{}' exited with {code}", record.name);
                    if drained {
                        finished.push(index);
                    }
                }
            } else if drained || handle.bump_drain_ticks() >= MAX_DRAIN_TICKS {
                finished.push(index);
            }
        }

        for index in finished {
            self.processes.remove(&index);
        }
    }

    /// SIGTERM every live process group, used during teardown.
    pub fn terminate_all(&mut self, records: &mut [LauncherRecord]) {
        for (&index, handle) in &mut self.processes {
            if !handle.is_alive() {
                continue;
            }
            match handle.signal(libc::SIGTERM) {
                Ok(()) => {
                    if let Some(record) = records.get_mut(index as usize) {
                        record.status.terminating = true;
                    }
                }
                Err(e) => warn!("[{index}] {e}"),
            }
        }
    }
}
