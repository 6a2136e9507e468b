use std::io;
use thiserror::Error;

/// Every way a controller run can fail.
///
/// Only [`SimError::Timeout`] is ever recovered from, and only when it comes
/// out of a heartbeat. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Out-of-range port or unusable config file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The peer sent a Start or Disconnect reply we could not make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// `disable` named a device that is not enabled.
    #[error("device '{kind} {name}' is not enabled")]
    NotFound { kind: String, name: String },
    /// A connection-level timeout.
    #[error("timed out: {0}")]
    Timeout(String),
    /// A script argument with a nonsensical value, e.g. a negative duration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A script line that does not parse as a command.
    #[error("script line {line}: {reason}")]
    Script { line: usize, reason: String },
    /// The disconnect retry policy ran out of attempts.
    #[error("peer rejected polite disconnect {attempts} times")]
    DisconnectRefused { attempts: u32 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SimError {
    /// Whether this error means "the peer lost us" and a fresh handshake
    /// should be attempted.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SimError::Timeout(_))
    }
}
