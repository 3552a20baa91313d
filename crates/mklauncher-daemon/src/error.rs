//! Error types for the launcher daemon.

use mklauncher_rpc::{
    Container, NOTE_ALREADY_RUNNING, NOTE_CALL_NOT_ALLOWED, NOTE_SHUTDOWN_FAILED,
    NOTE_UNKNOWN_COMMAND, NOTE_WRONG_INDEX, NOTE_WRONG_PARAMETERS, decode_error_note,
};

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] mklauncher_core::Error),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(#[from] mklauncher_rpc::CodecError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Failure of a single command, rendered as the note of an `ERROR` reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{}", NOTE_WRONG_INDEX)]
    WrongIndex,

    #[error("{}", NOTE_WRONG_PARAMETERS)]
    WrongParameters,

    #[error("{}", NOTE_UNKNOWN_COMMAND)]
    UnknownCommand,

    #[error("{}", NOTE_CALL_NOT_ALLOWED)]
    CallNotAllowed,

    #[error("{}", NOTE_ALREADY_RUNNING)]
    AlreadyRunning,

    #[error("{}", NOTE_SHUTDOWN_FAILED)]
    ShutdownFailed,

    /// Envelope could not be decoded
    #[error("{}", decode_error_note(.0))]
    Decode(String),

    /// Spawn failure with OS detail
    #[error("{0}")]
    Process(String),
}

impl From<CommandError> for Container {
    fn from(err: CommandError) -> Self {
        Container::error([err.to_string()])
    }
}

impl From<mklauncher_core::Error> for CommandError {
    fn from(err: mklauncher_core::Error) -> Self {
        match err {
            mklauncher_core::Error::AlreadyRunning(_) => Self::AlreadyRunning,
            mklauncher_core::Error::NotRunning(_) => Self::WrongIndex,
            other => Self::Process(other.to_string()),
        }
    }
}
