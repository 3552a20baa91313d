//! Peer bookkeeping for the status and command endpoints.

use std::collections::HashSet;

use bytes::Bytes;
use mklauncher_rpc::Multipart;
use tokio::sync::mpsc;

/// Opaque identity assigned to each accepted connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identity frame prepended to messages from this peer
    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }

    #[must_use]
    pub fn from_frame(frame: &[u8]) -> Self {
        Self(String::from_utf8_lossy(frame).into_owned())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which endpoint a peer connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Status,
    Command,
}

/// Event from a connection task to the socket loop
#[derive(Debug)]
pub enum PeerEvent {
    Connected {
        peer: PeerId,
        channel: Channel,
        sender: mpsc::UnboundedSender<Multipart>,
    },
    Message {
        peer: PeerId,
        channel: Channel,
        frames: Multipart,
    },
    Disconnected {
        peer: PeerId,
        channel: Channel,
    },
}

/// A connected status channel subscriber
#[derive(Debug)]
pub struct StatusPeer {
    pub sender: mpsc::UnboundedSender<Multipart>,
    pub topics: HashSet<String>,
}

impl StatusPeer {
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<Multipart>) -> Self {
        Self {
            sender,
            topics: HashSet::new(),
        }
    }

    /// Prefix match, as in publish/subscribe sockets
    #[must_use]
    pub fn wants(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| topic.starts_with(t.as_str()))
    }
}
