//! Status publication.
//!
//! Tracks whether anyone is subscribed to the launcher topic and, once per
//! poll tick, turns record changes into `FULL_UPDATE`, `INCREMENTAL_UPDATE`
//! and `PING` envelopes.

use mklauncher_core::{LauncherRecord, LauncherStatus, ServerSettings};
use mklauncher_rpc::{Container, ContainerType, LAUNCHER_TOPIC, Launcher, ProtocolParameters};
use tracing::{debug, trace};

/// Published view of one record's mutable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatusSnapshot {
    importance: i32,
    running: bool,
    terminating: bool,
    returncode: i32,
    output_len: usize,
    output_epoch: u64,
}

impl From<&LauncherStatus> for StatusSnapshot {
    fn from(status: &LauncherStatus) -> Self {
        Self {
            importance: status.importance,
            running: status.running,
            terminating: status.terminating,
            returncode: status.returncode,
            output_len: status.output.len(),
            output_epoch: status.output_epoch,
        }
    }
}

pub struct StatusPublisher {
    subscribed: bool,
    full_update_pending: bool,
    snapshots: Vec<StatusSnapshot>,
    tick: u32,
    ping_ticks: u32,
    keepalive_ms: u32,
}

impl StatusPublisher {
    #[must_use]
    pub fn new(settings: &ServerSettings) -> Self {
        Self {
            subscribed: false,
            full_update_pending: false,
            snapshots: Vec::new(),
            tick: 0,
            ping_ticks: settings.ping_ticks(),
            keepalive_ms: settings.keepalive_ms(),
        }
    }

    /// Topic this publisher serves
    #[must_use]
    pub fn topic(&self) -> &'static str {
        LAUNCHER_TOPIC
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    #[must_use]
    pub fn full_update_pending(&self) -> bool {
        self.full_update_pending
    }

    /// Every subscribe, including repeats, schedules a full update.
    pub fn subscribe(&mut self, topic: &str) {
        if topic != self.topic() {
            trace!("Ignoring subscription to unknown topic '{topic}'");
            return;
        }
        debug!("Subscribed to '{topic}'");
        self.subscribed = true;
        self.full_update_pending = true;
    }

    /// Called once the last subscriber of `topic` is gone.
    pub fn unsubscribe(&mut self, topic: &str) {
        if topic != self.topic() {
            return;
        }
        debug!("Unsubscribed from '{topic}'");
        self.subscribed = false;
    }

    /// Produce this tick's broadcasts.
    pub fn tick(&mut self, records: &[LauncherRecord]) -> Vec<Container> {
        let mut messages = Vec::new();

        if self.subscribed {
            if self.full_update_pending {
                messages.push(self.full_update(records));
                self.full_update_pending = false;
            } else if let Some(update) = self.incremental_update(records) {
                messages.push(update);
            }
        }
        self.snapshots = records.iter().map(|r| StatusSnapshot::from(&r.status)).collect();

        self.tick = self.tick.wrapping_add(1);
        if self.subscribed && self.ping_ticks > 0 && self.tick % self.ping_ticks == 0 {
            trace!("Sending ping");
            messages.push(Container::new(ContainerType::Ping));
        }

        messages
    }

    fn full_update(&self, records: &[LauncherRecord]) -> Container {
        debug!("Sending full update with {} launchers", records.len());
        Container {
            launcher: records.iter().map(LauncherRecord::to_launcher).collect(),
            pparams: Some(ProtocolParameters {
                keepalive_timer: self.keepalive_ms,
            }),
            ..Container::new(ContainerType::FullUpdate)
        }
    }

    fn incremental_update(&self, records: &[LauncherRecord]) -> Option<Container> {
        let launcher: Vec<Launcher> = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| status_delta(record, self.snapshots.get(i)))
            .collect();

        if launcher.is_empty() {
            return None;
        }
        trace!("Sending incremental update for {} launchers", launcher.len());
        Some(Container {
            launcher,
            ..Container::new(ContainerType::IncrementalUpdate)
        })
    }
}

/// Changed fields of `record` since `previous`, or `None` if nothing changed.
fn status_delta(record: &LauncherRecord, previous: Option<&StatusSnapshot>) -> Option<Launcher> {
    let status = &record.status;
    let Some(previous) = previous else {
        return Some(Launcher {
            importance: Some(status.importance),
            running: Some(status.running),
            terminating: Some(status.terminating),
            returncode: Some(status.returncode),
            output: Some(status.output.clone()),
            ..Launcher::with_index(record.index)
        });
    };

    let mut delta = Launcher::with_index(record.index);
    if status.importance != previous.importance {
        delta.importance = Some(status.importance);
    }
    if status.running != previous.running {
        delta.running = Some(status.running);
    }
    if status.terminating != previous.terminating {
        delta.terminating = Some(status.terminating);
    }
    if status.returncode != previous.returncode {
        delta.returncode = Some(status.returncode);
    }

    let restarted = status.output_epoch != previous.output_epoch;
    if restarted {
        // A run may start and exit between two ticks, so its final state is
        // always sent along with the whole output list
        delta.running = Some(status.running);
        delta.output = Some(status.output.clone());
    } else if status.output.len() > previous.output_len {
        delta.output = Some(status.output[previous.output_len..].to_vec());
    }
    if restarted || delta.running == Some(false) {
        delta.returncode = Some(status.returncode);
    }

    (!delta.is_empty()).then_some(delta)
}
