//! Plain-text, CRLF-terminated wire messages exchanged with the DGI.
//!
//! Outbound messages are built as strings. Inbound replies are split into
//! whitespace tokens and classified into a [`PeerMessage`] so that control
//! flow never has to look at raw text.

use crate::registry::Device;

/// Line terminator used by every message.
pub const CRLF: &str = "\r\n";

/// Sent to the state port to ask for a polite disconnect.
pub const DISCONNECT_REQUEST: &str = "PoliteDisconnect\r\n\r\n";

/// Most bytes read from a Start reply.
pub const START_BUFFER_SIZE: usize = 64;

/// Most bytes read from a disconnect reply.
pub const DISCONNECT_BUFFER_SIZE: usize = 32;

const STATE_PORT_KEY: &str = "StatePort";
const HEARTBEAT_PORT_KEY: &str = "HeartbeatPort";
const ACCEPTED_TOKEN: &str = "Accepted";
const REJECTED_TOKEN: &str = "Rejected";

/// Builds the Hello announcement: our listen port, one `type name` line per
/// device, then a blank line.
pub fn encode_hello(listen_port: u16, devices: &[Device]) -> String {
    let mut packet = format!("{}{}", listen_port, CRLF);
    for device in devices {
        packet.push_str(&device.kind);
        packet.push(' ');
        packet.push_str(&device.name);
        packet.push_str(CRLF);
    }
    packet.push_str(CRLF);
    packet
}

/// A reply received from the peer, classified by content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Ports for the new session. Values are unchecked integers; range
    /// validation happens when a `Session` is built from them.
    Start { state_port: i128, heartbeat_port: i128 },
    Accepted,
    Rejected,
    /// Anything else, with a description of what was wrong.
    Malformed(String),
}

impl PeerMessage {
    /// Classifies raw reply text.
    ///
    /// A reply carrying both port keys is a Start message; its values must be
    /// the tokens that immediately follow each key. Otherwise the first of
    /// `Accepted`/`Rejected` found wins, in that order of precedence.
    pub fn parse(text: &str) -> PeerMessage {
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let state = value_after(&tokens, STATE_PORT_KEY);
        let heartbeat = value_after(&tokens, HEARTBEAT_PORT_KEY);
        match (state, heartbeat) {
            (Some(state), Some(heartbeat)) => {
                return match (parse_port_token(state), parse_port_token(heartbeat)) {
                    (Ok(state_port), Ok(heartbeat_port)) => PeerMessage::Start {
                        state_port,
                        heartbeat_port,
                    },
                    (Err(reason), _) | (_, Err(reason)) => PeerMessage::Malformed(reason),
                };
            }
            (Some(_), None) | (None, Some(_)) => {
                return PeerMessage::Malformed(format!(
                    "Start message must carry both {} and {}: {:?}",
                    STATE_PORT_KEY, HEARTBEAT_PORT_KEY, text
                ));
            }
            (None, None) => {}
        }

        if tokens.contains(&ACCEPTED_TOKEN) {
            PeerMessage::Accepted
        } else if tokens.contains(&REJECTED_TOKEN) {
            PeerMessage::Rejected
        } else {
            PeerMessage::Malformed(format!("unrecognised reply: {:?}", text))
        }
    }
}

/// `Some("")` when the key is present but nothing follows it.
fn value_after<'a>(tokens: &[&'a str], key: &str) -> Option<&'a str> {
    let index = tokens.iter().position(|t| *t == key)?;
    Some(tokens.get(index + 1).copied().unwrap_or(""))
}

/// Any optionally signed run of digits is a number. Integers too wide for
/// `i128` saturate, which keeps them out of the port range.
fn parse_port_token(token: &str) -> Result<i128, String> {
    let negative = token.starts_with('-');
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected a numeric port, found {:?}", token));
    }
    Ok(token.parse::<i128>().unwrap_or(if negative {
        i128::MIN
    } else {
        i128::MAX
    }))
}
