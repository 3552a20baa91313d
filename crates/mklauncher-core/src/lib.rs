//! Core of the mklauncher daemon.
//!
//! - [`catalog`]: discovers `launcher.ini` descriptors and builds the ordered catalog
//! - [`importance`]: persisted per-launcher importance overrides
//! - [`supervisor`]: spawns, signals and polls launcher processes
//! - [`config`]: node configuration, loop timings and XDG paths

pub mod catalog;
pub mod config;
pub mod importance;
pub mod supervisor;

mod error;
mod record;

#[cfg(test)]
mod tests;

pub use catalog::{DESCRIPTOR_FILE, scan};
pub use config::{Directories, NodeConfig, ServerSettings};
pub use error::{Error, Result};
pub use importance::ImportanceStore;
pub use record::{LauncherId, LauncherRecord, LauncherStatus};
pub use supervisor::{ProcessState, ProcessSupervisor};

pub use mklauncher_types::*;
