//! Shared wire types for mklauncher components.
//!
//! This crate provides the envelope and launcher record types exchanged
//! between the launcher daemon and its clients. All types are serializable
//! for transport over the status and command channels.

use serde::{Deserialize, Serialize};

/// Serialize opaque byte blobs as lowercase hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Message type tag carried by every envelope.
///
/// Unknown tags decode to [`ContainerType::Unknown`] so the command server can
/// answer them with an error instead of failing to decode the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerType {
    Ping,
    PingAcknowledge,
    Error,
    FullUpdate,
    IncrementalUpdate,
    LauncherStart,
    LauncherTerminate,
    LauncherKill,
    LauncherWriteStdin,
    LauncherCall,
    LauncherShutdown,
    LauncherSet,
    Unknown(String),
}

impl ContainerType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "PING",
            Self::PingAcknowledge => "PING_ACKNOWLEDGE",
            Self::Error => "ERROR",
            Self::FullUpdate => "FULL_UPDATE",
            Self::IncrementalUpdate => "INCREMENTAL_UPDATE",
            Self::LauncherStart => "LAUNCHER_START",
            Self::LauncherTerminate => "LAUNCHER_TERMINATE",
            Self::LauncherKill => "LAUNCHER_KILL",
            Self::LauncherWriteStdin => "LAUNCHER_WRITE_STDIN",
            Self::LauncherCall => "LAUNCHER_CALL",
            Self::LauncherShutdown => "LAUNCHER_SHUTDOWN",
            Self::LauncherSet => "LAUNCHER_SET",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ContainerType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PING" => Self::Ping,
            "PING_ACKNOWLEDGE" => Self::PingAcknowledge,
            "ERROR" => Self::Error,
            "FULL_UPDATE" => Self::FullUpdate,
            "INCREMENTAL_UPDATE" => Self::IncrementalUpdate,
            "LAUNCHER_START" => Self::LauncherStart,
            "LAUNCHER_TERMINATE" => Self::LauncherTerminate,
            "LAUNCHER_KILL" => Self::LauncherKill,
            "LAUNCHER_WRITE_STDIN" => Self::LauncherWriteStdin,
            "LAUNCHER_CALL" => Self::LauncherCall,
            "LAUNCHER_SHUTDOWN" => Self::LauncherShutdown,
            "LAUNCHER_SET" => Self::LauncherSet,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ContainerType> for String {
    fn from(kind: ContainerType) -> Self {
        match kind {
            ContainerType::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ContainerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata of a launcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherInfo {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub variant: String,
}

/// Image attached to a launcher, shipped as an opaque blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub name: String,
    #[serde(with = "hex_bytes")]
    pub blob: Vec<u8>,
}

/// One captured line of process output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub index: u32,
    pub line: String,
}

/// Launcher record as carried on the wire.
///
/// Full updates set every field. Incremental updates set `index` plus the
/// fields that changed since the previous broadcast. Commands use `index`
/// and, for `LAUNCHER_SET`, `importance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launcher {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<LauncherInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminating: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<OutputLine>>,
}

impl Launcher {
    #[must_use]
    pub fn with_index(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// True when nothing but the index is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::with_index(self.index)
    }
}

/// Protocol parameters sent along with full updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// Heartbeat interval in milliseconds
    pub keepalive_timer: u32,
}

/// Envelope exchanged on both the status and command channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "type")]
    pub kind: ContainerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Payload for `LAUNCHER_WRITE_STDIN` and `LAUNCHER_CALL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launcher: Vec<Launcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pparams: Option<ProtocolParameters>,
}

impl Container {
    #[must_use]
    pub fn new(kind: ContainerType) -> Self {
        Self {
            kind,
            index: None,
            data: None,
            launcher: Vec::new(),
            note: Vec::new(),
            pparams: None,
        }
    }

    #[must_use]
    pub fn with_index(kind: ContainerType, index: u32) -> Self {
        Self {
            index: Some(index),
            ..Self::new(kind)
        }
    }

    /// Build an `ERROR` envelope carrying the given notes.
    #[must_use]
    pub fn error<I, S>(notes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            note: notes.into_iter().map(Into::into).collect(),
            ..Self::new(ContainerType::Error)
        }
    }
}

/// Announcement of one daemon endpoint in the service registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Node instance UUID shared by every service of the host
    pub uuid: String,
    /// Connectable address, `tcp://host:port`
    pub address: String,
    pub port: u16,
}
