use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("no complete frame within {0:?}")]
    FrameTimeout(Duration),
    #[error("command {command} takes {expected} argument(s), got {actual}")]
    ArgumentCountMismatch {
        command: String,
        expected: &'static str,
        actual: usize,
    },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed offset string: {0}")]
    MalformedOffsetString(String),
    #[error("offset for {channel} does not fit its field: {value}")]
    OffsetOutOfRange { channel: &'static str, value: String },
    #[error("command table mismatch at ordinal {ordinal}: expected {expected}, found {actual}")]
    TableMismatch {
        ordinal: usize,
        expected: String,
        actual: String,
    },
    #[error("report error: {0}")]
    Report(String),
    #[error("config error: {0}")]
    Config(String),
}

impl DriverError {
    /// Disconnect-class failures. These end the current session and are the
    /// only errors the supervisor turns into a reconnect.
    pub fn is_transport(&self) -> bool {
        match self {
            DriverError::Transport(_) | DriverError::Serial(_) => true,
            DriverError::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::FrameTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
