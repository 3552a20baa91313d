use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::record::{LauncherRecord, LauncherStatus};
use crate::{Error, Result};

/// Capacity of the per-child output queue
const OUTPUT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Terminating,
    /// Exit observed; lingering only to drain buffered output
    Exited { drain_ticks: u32 },
}

/// A spawned launcher process and its I/O plumbing
pub struct ProcessHandle {
    index: u32,
    child: Child,
    pgid: libc::pid_t,
    stdin_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    output_rx: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    state: ProcessState,
}

impl ProcessHandle {
    /// Spawn the record's command in its own process group.
    ///
    /// stdout and stderr share one pipe, read by a background task that is
    /// registered with the reactor. A grandchild still holding the write end
    /// cannot stall runtime shutdown.
    ///
    /// # Errors
    ///
    /// Returns `Error::Process` for an empty command or a failed spawn.
    pub fn spawn(record: &LauncherRecord) -> Result<Self> {
        let mut command = build_command(record)?;

        let (reader, writer) = io::pipe()?;
        let stderr_writer = writer.try_clone()?;
        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;

        command
            .current_dir(&record.workdir)
            .stdin(Stdio::piped())
            .stdout(writer)
            .stderr(stderr_writer)
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::Process(format!(
                "Failed to spawn '{}' in {}: {e}",
                record.command,
                record.workdir.display()
            ))
        })?;
        // Drop our copies of the write end so the reader sees EOF on exit
        drop(command);

        let pgid = child
            .id()
            .and_then(|pid| libc::pid_t::try_from(pid).ok())
            .ok_or_else(|| Error::Process("Spawned process has no pid".to_string()))?;

        let stdin_tx = child
            .stdin
            .take()
            .map(|stdin| spawn_stdin_writer(record.index, stdin));

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        let reader = spawn_output_reader(record.index, output, output_tx);

        debug!("[{}] Spawned pid {pgid}: {}", record.index, record.command);

        Ok(Self {
            index: record.index,
            child,
            pgid,
            stdin_tx,
            output_rx,
            reader,
            state: ProcessState::Running,
        })
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !matches!(self.state, ProcessState::Exited { .. })
    }

    /// Send `signal` to the whole process group.
    ///
    /// # Errors
    ///
    /// Returns `Error::Process` if the signal cannot be delivered.
    pub fn signal(&mut self, signal: libc::c_int) -> Result<()> {
        // SAFETY: killpg takes plain integers and has no memory preconditions
        let rc = unsafe { libc::killpg(self.pgid, signal) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // Group already gone: exit will be picked up by the next poll
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(Error::Process(format!(
                    "Failed to signal process group {}: {err}",
                    self.pgid
                )));
            }
            trace!("[{}] Process group {} already gone", self.index, self.pgid);
        }
        if self.state == ProcessState::Running {
            self.state = ProcessState::Terminating;
        }
        Ok(())
    }

    /// Queue bytes for the child's stdin. Returns false once stdin is closed.
    pub fn write_stdin(&self, bytes: Vec<u8>) -> bool {
        match &self.stdin_tx {
            Some(tx) if self.is_alive() => tx.send(bytes).is_ok(),
            _ => false,
        }
    }

    /// Move queued output lines into `status`. Returns true once the reader has finished.
    pub fn drain_output(&mut self, status: &mut LauncherStatus) -> bool {
        loop {
            match self.output_rx.try_recv() {
                Ok(line) => status.push_output(line),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Check for exit without blocking.
    pub fn try_exit(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.state = ProcessState::Exited { drain_ticks: 0 };
                self.stdin_tx = None;
                Some(returncode(status))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[{}] Failed to query process status: {e}", self.index);
                None
            }
        }
    }

    /// Count one more drain tick after exit
    pub fn bump_drain_ticks(&mut self) -> u32 {
        if let ProcessState::Exited { drain_ticks } = &mut self.state {
            *drain_ticks += 1;
            *drain_ticks
        } else {
            0
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // Orphans may keep the pipe open long after the child is gone
        self.reader.abort();
    }
}

fn build_command(record: &LauncherRecord) -> Result<Command> {
    if record.shell {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(&record.command);
        return Ok(command);
    }

    let mut parts = record.command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Error::Process("Empty command".to_string()))?;
    let mut command = Command::new(program);
    command.args(parts);
    Ok(command)
}

/// Exit code, or the negated signal number for signal deaths
fn returncode(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(-1, |signal| -signal))
}

fn spawn_stdin_writer(index: u32, stdin: ChildStdin) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut stdin = stdin;
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = stdin.write_all(&bytes).await {
                error!("[{index}] Failed to write to stdin: {e}");
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("[{index}] Failed to flush stdin: {e}");
                break;
            }
        }
    });
    tx
}

fn spawn_output_reader(
    index: u32,
    output: pipe::Receiver,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(output);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("[{index}] Output read failed: {e}");
                    break;
                }
            }
        }
        trace!("[{index}] Output reader finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returncode_from_exit_code() {
        assert_eq!(returncode(ExitStatus::from_raw(0)), 0);
        assert_eq!(returncode(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_returncode_from_signal() {
        assert_eq!(returncode(ExitStatus::from_raw(libc::SIGTERM)), -libc::SIGTERM);
        assert_eq!(returncode(ExitStatus::from_raw(libc::SIGKILL)), -9);
    }

    #[test]
    fn test_build_command_rejects_empty() {
        let record = crate::tests::fixtures::make_record(0, "   ");
        assert!(matches!(build_command(&record), Err(Error::Process(_))));
    }

    #[test]
    fn test_build_command_splits_whitespace() {
        let record = crate::tests::fixtures::make_record(0, "echo  hello   world");
        let command = build_command(&record).unwrap();
        let std = command.as_std();
        assert_eq!(std.get_program(), "echo");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["hello", "world"]);
    }

    #[test]
    fn test_build_command_shell() {
        let mut record = crate::tests::fixtures::make_record(0, "echo $HOME | wc -c");
        record.shell = true;
        let command = build_command(&record).unwrap();
        let std = command.as_std();
        assert_eq!(std.get_program(), "/bin/sh");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["-c", "echo $HOME | wc -c"]);
    }
}
