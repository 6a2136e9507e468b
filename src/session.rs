//! The peer endpoint and the live session negotiated with it.

use crate::error::SimError;

/// Where the peer lives and where we listen for its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub peer_host: String,
    /// The peer's handshake port, target of every Hello.
    pub peer_port: u16,
    pub listen_port: u16,
}

impl Endpoint {
    pub fn new(peer_host: impl Into<String>, peer_port: u16, listen_port: u16) -> Self {
        Self {
            peer_host: peer_host.into(),
            peer_port,
            listen_port,
        }
    }
}

/// A live connection context, produced by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub endpoint: Endpoint,
    pub state_port: u16,
    pub heartbeat_port: u16,
}

impl Session {
    /// Builds a session from the raw port numbers of a Start message.
    ///
    /// Values outside the TCP port range are a configuration error.
    pub fn from_start(
        endpoint: Endpoint,
        state_port: i128,
        heartbeat_port: i128,
    ) -> Result<Self, SimError> {
        Ok(Self {
            endpoint,
            state_port: checked_port("StatePort", state_port)?,
            heartbeat_port: checked_port("HeartbeatPort", heartbeat_port)?,
        })
    }

    pub fn peer_host(&self) -> &str {
        &self.endpoint.peer_host
    }
}

fn checked_port(label: &str, value: i128) -> Result<u16, SimError> {
    u16::try_from(value)
        .map_err(|_| SimError::Configuration(format!("{} {} not sensible", label, value)))
}
