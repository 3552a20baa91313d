//! Test fixtures and helpers

use std::time::Duration;

use crate::record::{LauncherId, LauncherRecord, LauncherStatus};
use crate::supervisor::ProcessSupervisor;
use mklauncher_types::LauncherInfo;

/// Create a launcher record running `command` from the temp directory
pub fn make_record(index: u32, command: &str) -> LauncherRecord {
    LauncherRecord {
        index,
        id: LauncherId::new("/configs", format!("launcher{index}")),
        name: "Launcher".to_string(),
        description: String::new(),
        info: LauncherInfo::default(),
        priority: 0,
        command: command.to_string(),
        shell: false,
        workdir: std::env::temp_dir(),
        image: None,
        status: LauncherStatus::default(),
    }
}

/// Same as [`make_record`] but run through `/bin/sh -c`
pub fn make_shell_record(index: u32, command: &str) -> LauncherRecord {
    LauncherRecord {
        shell: true,
        ..make_record(index, command)
    }
}

/// Poll the supervisor until `done` holds for the record at `index`, or give up after 5s.
pub async fn poll_until(
    supervisor: &mut ProcessSupervisor,
    records: &mut [LauncherRecord],
    index: usize,
    done: impl Fn(&LauncherRecord) -> bool,
) -> bool {
    for _ in 0..250 {
        supervisor.poll(records);
        if done(&records[index]) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
