//! The three network exchanges a controller has with the DGI, and the TCP
//! implementation of them.
//!
//! All socket calls block. Accepting a reply has no timeout: if the peer
//! never connects back, the controller waits forever.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::disconnect::{negotiate, RetryPolicy};
use crate::error::SimError;
use crate::message::{
    encode_hello, PeerMessage, DISCONNECT_BUFFER_SIZE, DISCONNECT_REQUEST, START_BUFFER_SIZE,
};
use crate::registry::Device;
use crate::session::{Endpoint, Session};

/// The protocol operations the script driver depends on.
pub trait Protocol {
    /// Announces `devices` to the peer and waits for its Start reply.
    fn handshake(&mut self, endpoint: &Endpoint, devices: &[Device]) -> Result<Session, SimError>;

    /// Proves liveness once. A [`SimError::Timeout`] means the peer lost us.
    fn heartbeat(&mut self, session: &Session) -> Result<(), SimError>;

    /// Asks the peer to let us go, retrying until it agrees.
    fn polite_disconnect(&mut self, session: &Session) -> Result<(), SimError>;

    /// Simulated outage or idle time.
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Timing of a single heartbeat: connect, hold, close, rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTiming {
    pub hold: Duration,
    pub rest: Duration,
    pub connect_timeout: Duration,
}

impl Default for HeartbeatTiming {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(500),
            rest: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Speaks the DGI protocol over plain TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpProtocol {
    pub heartbeat: HeartbeatTiming,
    pub retry: RetryPolicy,
}

impl TcpProtocol {
    pub fn new(heartbeat: HeartbeatTiming, retry: RetryPolicy) -> Self {
        Self { heartbeat, retry }
    }
}

impl Protocol for TcpProtocol {
    fn handshake(&mut self, endpoint: &Endpoint, devices: &[Device]) -> Result<Session, SimError> {
        // Listen first so the Start reply cannot beat us.
        let listener = bind_listener(endpoint.listen_port)?;

        let hello = encode_hello(endpoint.listen_port, devices);
        send_and_close(&endpoint.peer_host, endpoint.peer_port, &hello)?;
        info!("Sent Hello message:\n{}", hello);

        let reply = receive_reply(listener, START_BUFFER_SIZE, "Start")?;
        info!("Received Start message:\n{}", reply);

        match PeerMessage::parse(&reply) {
            PeerMessage::Start {
                state_port,
                heartbeat_port,
            } => {
                let session = Session::from_start(endpoint.clone(), state_port, heartbeat_port)?;
                info!(
                    "Received StatePort={}, HeartbeatPort={}",
                    session.state_port, session.heartbeat_port
                );
                Ok(session)
            }
            PeerMessage::Malformed(reason) => Err(SimError::Protocol(format!(
                "received malformed Start message from DGI: {}",
                reason
            ))),
            other => Err(SimError::Protocol(format!(
                "received malformed Start message from DGI: expected ports, got {:?}",
                other
            ))),
        }
    }

    fn heartbeat(&mut self, session: &Session) -> Result<(), SimError> {
        info!(
            "Sending heartbeat to {} {}",
            session.peer_host(),
            session.heartbeat_port
        );
        let addrs = resolve(session.peer_host(), session.heartbeat_port)?;
        let stream = connect_any(&addrs, self.heartbeat.connect_timeout).map_err(|e| {
            connect_error(
                e,
                &format!("heartbeat to {}:{}", session.peer_host(), session.heartbeat_port),
            )
        })?;
        thread::sleep(self.heartbeat.hold);
        drop(stream);
        thread::sleep(self.heartbeat.rest);
        Ok(())
    }

    /// The request carries no device state; sending current state with it
    /// is an open requirement of the protocol.
    fn polite_disconnect(&mut self, session: &Session) -> Result<(), SimError> {
        let endpoint = &session.endpoint;
        negotiate(&self.retry, |attempt| {
            let listener = bind_listener(endpoint.listen_port)?;
            info!(attempt, "Sending PoliteDisconnect request to DGI");
            send_and_close(&endpoint.peer_host, session.state_port, DISCONNECT_REQUEST)?;
            let reply = receive_reply(listener, DISCONNECT_BUFFER_SIZE, "disconnect")?;
            Ok(PeerMessage::parse(&reply))
        })?;
        Ok(())
    }
}

fn bind_listener(port: u16) -> Result<TcpListener, SimError> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    debug!(port, "listening for DGI reply");
    Ok(listener)
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, SimError> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(SimError::Configuration(format!(
            "could not resolve DGI host {:?}",
            host
        )));
    }
    Ok(addrs)
}

/// Tries each address in turn, like `TcpStream::connect`, but with a
/// timeout per attempt. The error is the last attempt's.
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to")))
}

/// Only a timed-out connect means the peer lost us; anything else is fatal.
fn connect_error(e: io::Error, what: &str) -> SimError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SimError::Timeout(what.to_string()),
        _ => SimError::Io(e),
    }
}

/// Fire-and-forget: connect, write everything, close.
fn send_and_close(host: &str, port: u16, payload: &str) -> Result<(), SimError> {
    let mut stream = TcpStream::connect((host, port))?;
    stream.write_all(payload.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Accepts one connection and performs a single bounded read.
///
/// A reply longer than `capacity` is cut off; we only log that it may have
/// been.
fn receive_reply(listener: TcpListener, capacity: usize, what: &str) -> Result<String, SimError> {
    let (mut stream, peer) = listener.accept()?;
    drop(listener);
    debug!(%peer, "accepted {} reply", what);

    let mut buf = vec![0u8; capacity];
    let n = stream.read(&mut buf)?;
    if n == capacity {
        warn!(
            capacity,
            "{} reply filled the read buffer and may be truncated", what
        );
    }
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}
