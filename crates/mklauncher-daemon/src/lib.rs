//! Machinekit launcher daemon library.
//!
//! This crate provides the status and command endpoints, the status
//! publisher, command handlers and the service announcement used by the
//! `mklauncher-daemon` binary.

pub mod announcer;
pub mod error;
pub mod handlers;
pub mod publisher;
pub mod server;
pub mod session;
pub mod shutdown;

pub use announcer::{FileAnnouncer, ServiceAnnouncer, announce_host, service_name};
pub use error::{CommandError, DaemonError, Result};
pub use handlers::{HandlerContext, handle_command, handle_frame};
pub use publisher::StatusPublisher;
pub use server::{Daemon, DaemonConfig, DaemonState, run};
pub use session::{Channel, PeerEvent, PeerId, StatusPeer};
pub use shutdown::{CommandShutdown, DEFAULT_SHUTDOWN_COMMAND, SystemShutdown};
