//! # Fake Device Controller Library
//!
//! This library contains the core logic for impersonating an embedded device
//! controller in a conversation with a DGI peer over TCP. A script of
//! commands enables and disables simulated devices, and the controller
//! handshakes, heartbeats and politely disconnects exactly as real hardware
//! would, so the DGI can be tested without it.
//!
//! Everything runs on the calling thread with blocking sockets. Heartbeats
//! are only sent between script commands, never from a background timer.

pub mod config;
pub mod disconnect;
pub mod driver;
pub mod error;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod script;
pub mod session;

pub use config::ControllerConfig;
pub use disconnect::RetryPolicy;
pub use driver::{DriverOptions, LinkState, RunStats, ScriptDriver};
pub use error::SimError;
pub use message::PeerMessage;
pub use protocol::{HeartbeatTiming, Protocol, TcpProtocol};
pub use registry::{Device, DeviceRegistry};
pub use script::Command;
pub use session::{Endpoint, Session};
