//! Tests for process start, signalling, output capture and exit detection

use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::fixtures::{make_record, make_shell_record, poll_until};
use crate::Error;
use crate::supervisor::ProcessSupervisor;

#[tokio::test]
async fn test_start_captures_output_and_exit() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "echo hello")];

    supervisor.start(&mut records[0]).unwrap();
    assert!(records[0].status.running);
    assert!(supervisor.is_running(0));

    let done = poll_until(&mut supervisor, &mut records, 0, |r| {
        !r.status.running && !r.status.output.is_empty()
    })
    .await;
    assert!(done, "process did not finish");

    let status = &records[0].status;
    assert_eq!(status.returncode, 0);
    assert_eq!(status.output.len(), 1);
    assert_eq!(status.output[0].index, 0);
    assert_eq!(status.output[0].line, "hello");
    assert!(!supervisor.is_running(0));
}

#[tokio::test]
async fn test_nonzero_exit_code() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_shell_record(0, "exit 3")];

    supervisor.start(&mut records[0]).unwrap();
    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert_eq!(records[0].status.returncode, 3);
}

#[tokio::test]
async fn test_stderr_merged_in_order() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_shell_record(0, "echo one; echo two 1>&2; printf three")];

    supervisor.start(&mut records[0]).unwrap();
    let done = poll_until(&mut supervisor, &mut records, 0, |r| {
        !r.status.running && r.status.output.len() == 3
    })
    .await;
    assert!(done);

    let lines: Vec<_> = records[0]
        .status
        .output
        .iter()
        .map(|o| o.line.as_str())
        .collect();
    assert_eq!(lines, ["one", "two", "three"]);
    let indices: Vec<_> = records[0].status.output.iter().map(|o| o.index).collect();
    assert_eq!(indices, [0, 1, 2]);
}

#[tokio::test]
async fn test_terminate_reports_negative_signal() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "sleep 30")];

    supervisor.start(&mut records[0]).unwrap();
    supervisor.terminate(&mut records[0]).unwrap();
    assert!(records[0].status.terminating);

    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert_eq!(records[0].status.returncode, -libc::SIGTERM);
    assert!(!records[0].status.terminating);
}

#[tokio::test]
async fn test_kill_reports_negative_signal() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "sleep 30")];

    supervisor.start(&mut records[0]).unwrap();
    supervisor.kill(&mut records[0]).unwrap();

    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert_eq!(records[0].status.returncode, -9);
}

#[tokio::test]
async fn test_kill_after_ignored_terminate() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_shell_record(0, "trap '' TERM; sleep 30")];

    supervisor.start(&mut records[0]).unwrap();
    // Let the shell install its trap first
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.terminate(&mut records[0]).unwrap();

    for _ in 0..10 {
        supervisor.poll(&mut records);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(records[0].status.running);
    assert!(records[0].status.terminating);
    assert!(supervisor.is_running(0));

    supervisor.kill(&mut records[0]).unwrap();
    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert_eq!(records[0].status.returncode, -libc::SIGKILL);
    assert!(!records[0].status.terminating);
}

#[tokio::test]
async fn test_terminate_reaches_process_group() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_shell_record(0, "sleep 30; echo unreachable")];

    supervisor.start(&mut records[0]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.terminate(&mut records[0]).unwrap();

    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert!(records[0].status.returncode < 0);
    assert!(records[0].status.output.iter().all(|o| o.line != "unreachable"));
}

#[tokio::test]
async fn test_write_stdin_forwards_bytes() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "cat")];

    supervisor.start(&mut records[0]).unwrap();
    assert!(supervisor.write_stdin(0, b"ping\n".to_vec()));

    let echoed = poll_until(&mut supervisor, &mut records, 0, |r| {
        r.status.output.iter().any(|o| o.line == "ping")
    })
    .await;
    assert!(echoed);

    supervisor.terminate(&mut records[0]).unwrap();
    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
}

#[tokio::test]
async fn test_write_stdin_when_not_running() {
    let supervisor = ProcessSupervisor::new();
    assert!(!supervisor.write_stdin(0, b"ignored\n".to_vec()));
}

#[tokio::test]
async fn test_spawn_failure_leaves_record_untouched() {
    let mut supervisor = ProcessSupervisor::new();
    let mut record = make_record(0, "echo hello");
    record.workdir = PathBuf::from("/nonexistent/mklauncher/workdir");
    record.status.push_output("previous run".to_string());

    let err = supervisor.start(&mut record).unwrap_err();
    assert!(matches!(err, Error::Process(_)));
    assert!(!record.status.running);
    assert_eq!(record.status.output.len(), 1);
    assert!(!supervisor.is_running(0));
}

#[tokio::test]
async fn test_missing_program_is_process_error() {
    let mut supervisor = ProcessSupervisor::new();
    let mut record = make_record(0, "/nonexistent/mklauncher-binary --flag");
    assert!(matches!(
        supervisor.start(&mut record),
        Err(Error::Process(_))
    ));
}

#[tokio::test]
async fn test_start_while_running_rejected() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "sleep 30")];

    supervisor.start(&mut records[0]).unwrap();
    let err = supervisor.start(&mut records[0]).unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(0)));
    assert_eq!(supervisor.running_count(), 1);

    supervisor.kill(&mut records[0]).unwrap();
    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
}

#[tokio::test]
async fn test_signal_without_process_is_not_running() {
    let mut supervisor = ProcessSupervisor::new();
    let mut record = make_record(1, "true");
    assert!(matches!(
        supervisor.terminate(&mut record),
        Err(Error::NotRunning(1))
    ));
    assert!(matches!(supervisor.kill(&mut record), Err(Error::NotRunning(1))));
    assert!(!record.status.terminating);
}

#[tokio::test]
async fn test_restart_clears_output() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_shell_record(0, "echo first; echo second")];

    supervisor.start(&mut records[0]).unwrap();
    assert!(
        poll_until(&mut supervisor, &mut records, 0, |r| {
            !r.status.running && r.status.output.len() == 2
        })
        .await
    );

    records[0].command = "echo again".to_string();
    supervisor.start(&mut records[0]).unwrap();
    assert!(records[0].status.output.is_empty());

    assert!(
        poll_until(&mut supervisor, &mut records, 0, |r| {
            !r.status.running && !r.status.output.is_empty()
        })
        .await
    );
    assert_eq!(records[0].status.output.len(), 1);
    assert_eq!(records[0].status.output[0].index, 0);
    assert_eq!(records[0].status.output[0].line, "again");
}

#[tokio::test]
async fn test_terminate_all_signals_every_process() {
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "sleep 30"), make_record(1, "sleep 30")];

    supervisor.start(&mut records[0]).unwrap();
    supervisor.start(&mut records[1]).unwrap();
    assert_eq!(supervisor.running_count(), 2);

    supervisor.terminate_all(&mut records);
    assert!(records.iter().all(|r| r.status.terminating));

    assert!(poll_until(&mut supervisor, &mut records, 0, |r| !r.status.running).await);
    assert!(poll_until(&mut supervisor, &mut records, 1, |r| !r.status.running).await);
    assert_eq!(supervisor.running_count(), 0);
}

#[tokio::test]
async fn test_workdir_respected() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut supervisor = ProcessSupervisor::new();
    let mut records = vec![make_record(0, "pwd")];
    records[0].workdir = std::fs::canonicalize(dir.path()).unwrap();

    supervisor.start(&mut records[0]).unwrap();
    assert!(
        poll_until(&mut supervisor, &mut records, 0, |r| {
            !r.status.running && !r.status.output.is_empty()
        })
        .await
    );
    assert_eq!(
        PathBuf::from(&records[0].status.output[0].line),
        records[0].workdir
    );
}

#[test]
fn test_orphan_holding_output_does_not_block_runtime_shutdown() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let mut supervisor = ProcessSupervisor::new();
        // The backgrounded sleep inherits the output pipe and outlives its parent
        let mut records = vec![make_shell_record(0, "sleep 3 & echo started")];

        supervisor.start(&mut records[0]).unwrap();
        let done = poll_until(&mut supervisor, &mut records, 0, |r| {
            !r.status.running && r.status.output.iter().any(|o| o.line == "started")
        })
        .await;
        assert!(done);
        assert_eq!(records[0].status.returncode, 0);
    });

    let started = Instant::now();
    drop(runtime);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "runtime shutdown took {:?}",
        started.elapsed()
    );
}
