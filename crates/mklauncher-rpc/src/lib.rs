//! Wire protocol for mklauncher.
//!
//! This crate provides the multipart transport codec, the channel-level
//! protocol helpers and client wrappers for the two daemon endpoints:
//!
//! - [`transport`]: Length-prefixed multipart codec for message framing
//! - [`protocol`]: Topics, subscription frames, envelope encoding, error notes
//! - [`client`]: Status subscriber and command client over TCP
//! - [`discovery`]: File-based service registry lookup
//!
//! # Example
//!
//! ```no_run
//! use mklauncher_rpc::{StatusClient, LAUNCHER_TOPIC};
//!
//! # async fn example() -> Result<(), mklauncher_rpc::ClientError> {
//! let mut status = StatusClient::connect("127.0.0.1:5600").await?;
//! status.subscribe(LAUNCHER_TOPIC).await?;
//!
//! let (_topic, update) = status.recv().await?;
//! println!("{} launchers", update.launcher.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
pub mod protocol;
pub mod transport;

pub use client::{ClientError, CommandClient, StatusClient, endpoint_address};
pub use discovery::{discover_services, find_service, service_file};

pub use protocol::{
    COMMAND_SERVICE_TYPE, DECODE_ERROR_PREFIX, LAUNCHER_TOPIC, NOTE_ALREADY_RUNNING,
    NOTE_CALL_NOT_ALLOWED, NOTE_SHUTDOWN_FAILED, NOTE_UNKNOWN_COMMAND, NOTE_WRONG_INDEX,
    NOTE_WRONG_PARAMETERS, STATUS_SERVICE_TYPE, Subscription, broadcast_message,
    decode_container, decode_error_note, encode_container, split_envelope,
};

pub use transport::{CodecError, Multipart, MultipartCodec};

pub use mklauncher_types::{
    Container, ContainerType, ImageData, Launcher, LauncherInfo, OutputLine, ProtocolParameters,
    ServiceDescriptor,
};
