//! Retry policy for the polite-disconnect negotiation.

use std::thread;
use std::time::Duration;

use tracing::info;

use crate::error::SimError;
use crate::message::PeerMessage;

/// How often to re-ask after the peer rejects a disconnect.
///
/// The default retries forever without delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// `None` means unbounded.
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Runs `attempt` until the peer answers `Accepted`, returning the number of
/// attempts made.
///
/// `attempt` performs one request/reply exchange and is given the 1-based
/// attempt number. A malformed reply ends the negotiation with a protocol
/// error.
pub fn negotiate<F>(policy: &RetryPolicy, mut attempt: F) -> Result<u32, SimError>
where
    F: FnMut(u32) -> Result<PeerMessage, SimError>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt(attempts)? {
            PeerMessage::Accepted => {
                info!(attempts, "Disconnect request accepted");
                return Ok(attempts);
            }
            PeerMessage::Rejected => {
                info!(attempts, "Disconnect request rejected");
                if policy.exhausted(attempts) {
                    return Err(SimError::DisconnectRefused { attempts });
                }
                if !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff);
                }
            }
            PeerMessage::Start { .. } => {
                return Err(SimError::Protocol(
                    "disconnect response malformed: got a Start message".to_string(),
                ));
            }
            PeerMessage::Malformed(reason) => {
                return Err(SimError::Protocol(format!(
                    "disconnect response malformed: {}",
                    reason
                )));
            }
        }
    }
}
