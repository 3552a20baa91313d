//! Channel-level protocol definitions.
//!
//! Envelope encoding, subscription frames for the status channel, identity
//! routing for the command channel and the textual error notes shared by the
//! daemon and its clients.

use bytes::Bytes;
use mklauncher_types::Container;

use crate::transport::Multipart;

/// Topic carrying launcher status broadcasts
pub const LAUNCHER_TOPIC: &str = "launcher";

/// Service type announced for the status channel
pub const STATUS_SERVICE_TYPE: &str = "launcher";

/// Service type announced for the command channel
pub const COMMAND_SERVICE_TYPE: &str = "launchercmd";

pub const NOTE_WRONG_INDEX: &str = "wrong index";
pub const NOTE_WRONG_PARAMETERS: &str = "wrong parameters";
pub const NOTE_UNKNOWN_COMMAND: &str = "unknown command";
pub const NOTE_CALL_NOT_ALLOWED: &str = "process call not allowed";
pub const NOTE_ALREADY_RUNNING: &str = "launcher already running";
pub const NOTE_SHUTDOWN_FAILED: &str = "unable to request system shutdown";

/// Prefix of the note returned for undecodable envelopes
pub const DECODE_ERROR_PREFIX: &str = "Protobuf Decode Error";

const SUBSCRIBE_FLAG: u8 = 0x01;
const UNSUBSCRIBE_FLAG: u8 = 0x00;

/// Subscription message sent by status channel clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    Subscribe(String),
    Unsubscribe(String),
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) => topic,
        }
    }

    /// Parse a one-frame subscription message (`0x01` or `0x00` followed by the topic).
    #[must_use]
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let (&flag, topic) = frame.split_first()?;
        let topic = String::from_utf8_lossy(topic).into_owned();
        match flag {
            SUBSCRIBE_FLAG => Some(Self::Subscribe(topic)),
            UNSUBSCRIBE_FLAG => Some(Self::Unsubscribe(topic)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        let (flag, topic) = match self {
            Self::Subscribe(topic) => (SUBSCRIBE_FLAG, topic),
            Self::Unsubscribe(topic) => (UNSUBSCRIBE_FLAG, topic),
        };
        let mut frame = Vec::with_capacity(topic.len() + 1);
        frame.push(flag);
        frame.extend_from_slice(topic.as_bytes());
        Bytes::from(frame)
    }
}

/// Serialize an envelope into a single frame.
///
/// # Errors
///
/// Returns an error if the envelope cannot be serialized.
pub fn encode_container(container: &Container) -> serde_json::Result<Bytes> {
    serde_json::to_vec(container).map(Bytes::from)
}

/// Deserialize an envelope frame.
///
/// # Errors
///
/// Returns an error if the frame is not a valid envelope.
pub fn decode_container(frame: &[u8]) -> serde_json::Result<Container> {
    serde_json::from_slice(frame)
}

/// Build a status broadcast: `[topic, envelope]`.
///
/// # Errors
///
/// Returns an error if the envelope cannot be serialized.
pub fn broadcast_message(topic: &str, container: &Container) -> serde_json::Result<Multipart> {
    Ok(vec![
        Bytes::copy_from_slice(topic.as_bytes()),
        encode_container(container)?,
    ])
}

/// Split a routed command message into its identity frames and envelope frame.
///
/// Returns `None` for a message without any frame.
#[must_use]
pub fn split_envelope(mut frames: Multipart) -> Option<(Multipart, Bytes)> {
    let envelope = frames.pop()?;
    Some((frames, envelope))
}

/// Format the note for an undecodable envelope
#[must_use]
pub fn decode_error_note(detail: impl std::fmt::Display) -> String {
    format!("{DECODE_ERROR_PREFIX}: {detail}")
}
