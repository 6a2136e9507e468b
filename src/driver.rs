//! The script driver: a two-state machine (disconnected / connected) that
//! replays script commands against a [`Protocol`].

use std::mem;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::SimError;
use crate::protocol::Protocol;
use crate::registry::DeviceRegistry;
use crate::script::{parse_line, Command};
use crate::session::{Endpoint, Session};

/// Whether a session with the peer is currently open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected(Session),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub commands: usize,
    pub handshakes: usize,
    pub heartbeats: usize,
    pub disconnects: usize,
    /// Handshakes forced by a heartbeat timeout.
    pub recoveries: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverOptions {
    /// Politely disconnect once the script is exhausted. Off by default: a
    /// plain run leaves the last session open.
    pub disconnect_on_exit: bool,
}

pub struct ScriptDriver<P> {
    protocol: P,
    endpoint: Endpoint,
    registry: DeviceRegistry,
    state: LinkState,
    options: DriverOptions,
    stats: RunStats,
}

impl<P: Protocol> ScriptDriver<P> {
    pub fn new(protocol: P, endpoint: Endpoint, options: DriverOptions) -> Self {
        Self {
            protocol,
            endpoint,
            registry: DeviceRegistry::new(),
            state: LinkState::Disconnected,
            options,
            stats: RunStats::default(),
        }
    }

    /// Parses and executes `lines` in order, stopping at the first fatal
    /// error.
    pub fn run<I, S>(&mut self, lines: I) -> Result<RunStats, SimError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (index, line) in lines.into_iter().enumerate() {
            if let Some(command) = parse_line(index + 1, line.as_ref())? {
                self.execute(&command)?;
            }
        }
        self.finish()?;
        Ok(self.stats)
    }

    /// Executes one command, then sends the trailing heartbeat.
    pub fn execute(&mut self, command: &Command) -> Result<(), SimError> {
        info!("Processing command {}", command);
        self.stats.commands += 1;

        match command {
            Command::Enable(device) => {
                self.registry.enable(device.clone());
                self.reannounce()?;
            }
            Command::Disable(device) => {
                self.registry.disable(device)?;
                self.reannounce()?;
            }
            Command::DieHorribly(seconds) => {
                warn!("Dying horribly for {}s", seconds);
                self.state = LinkState::Disconnected;
                self.protocol.pause(Duration::from_secs(*seconds));
                self.handshake()?;
            }
            Command::Sleep(seconds) => {
                for tick in 0..*seconds {
                    if self.is_connected() {
                        info!("Sleep {}", tick);
                        self.beat()?;
                    }
                }
            }
        }

        self.beat()
    }

    /// End-of-script handling.
    pub fn finish(&mut self) -> Result<(), SimError> {
        match mem::take(&mut self.state) {
            LinkState::Connected(session) if self.options.disconnect_on_exit => {
                self.disconnect(&session)?;
            }
            LinkState::Connected(session) => {
                info!(
                    state_port = session.state_port,
                    "Script finished with the session still open"
                );
                self.state = LinkState::Connected(session);
            }
            LinkState::Disconnected => {}
        }
        Ok(())
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    /// Closes any open session, then announces the current device set.
    fn reannounce(&mut self) -> Result<(), SimError> {
        if let LinkState::Connected(session) = mem::take(&mut self.state) {
            self.disconnect(&session)?;
        }
        self.handshake()
    }

    fn handshake(&mut self) -> Result<(), SimError> {
        let session = self
            .protocol
            .handshake(&self.endpoint, self.registry.devices())?;
        self.stats.handshakes += 1;
        self.state = LinkState::Connected(session);
        Ok(())
    }

    fn disconnect(&mut self, session: &Session) -> Result<(), SimError> {
        self.protocol.polite_disconnect(session)?;
        self.stats.disconnects += 1;
        Ok(())
    }

    /// One heartbeat if connected. A timeout forces a fresh handshake.
    fn beat(&mut self) -> Result<(), SimError> {
        let LinkState::Connected(session) = &self.state else {
            return Ok(());
        };
        match self.protocol.heartbeat(session) {
            Ok(()) => {
                self.stats.heartbeats += 1;
                Ok(())
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "Timeout from DGI, sending a new Hello");
                self.stats.recoveries += 1;
                self.state = LinkState::Disconnected;
                self.handshake()
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Device;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Handshake(Vec<Device>),
        Heartbeat(u16),
        Disconnect(u16),
        Pause(Duration),
    }

    #[derive(Debug, Clone, Copy)]
    enum Beat {
        Ok,
        Timeout,
        Refused,
    }

    /// Records every call; hands out fresh ports on each handshake.
    #[derive(Default)]
    struct MockProtocol {
        calls: Vec<Call>,
        beats: VecDeque<Beat>,
        malformed_start: bool,
        next_port: u16,
    }

    impl MockProtocol {
        fn with_beats(beats: &[Beat]) -> Self {
            Self {
                beats: beats.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(*c)).count()
        }
    }

    impl Protocol for MockProtocol {
        fn handshake(
            &mut self,
            endpoint: &Endpoint,
            devices: &[Device],
        ) -> Result<Session, SimError> {
            self.calls.push(Call::Handshake(devices.to_vec()));
            if self.malformed_start {
                return Err(SimError::Protocol("missing HeartbeatPort".into()));
            }
            let base = 4000 + self.next_port;
            self.next_port += 2;
            Session::from_start(endpoint.clone(), i128::from(base), i128::from(base) + 1)
        }

        fn heartbeat(&mut self, session: &Session) -> Result<(), SimError> {
            self.calls.push(Call::Heartbeat(session.heartbeat_port));
            match self.beats.pop_front().unwrap_or(Beat::Ok) {
                Beat::Ok => Ok(()),
                Beat::Timeout => Err(SimError::Timeout("heartbeat".into())),
                Beat::Refused => Err(SimError::Io(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                ))),
            }
        }

        fn polite_disconnect(&mut self, session: &Session) -> Result<(), SimError> {
            self.calls.push(Call::Disconnect(session.state_port));
            Ok(())
        }

        fn pause(&mut self, duration: Duration) {
            self.calls.push(Call::Pause(duration));
        }
    }

    fn driver(protocol: MockProtocol) -> ScriptDriver<MockProtocol> {
        ScriptDriver::new(
            protocol,
            Endpoint::new("localhost", 1870, 5001),
            DriverOptions::default(),
        )
    }

    fn light() -> Device {
        Device::new("light", "L1")
    }

    #[test]
    fn enable_from_disconnected_handshakes_once() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1"]).unwrap();

        assert_eq!(
            d.protocol().calls,
            vec![Call::Handshake(vec![light()]), Call::Heartbeat(4001)]
        );
        assert!(d.is_connected());
    }

    #[test]
    fn enable_then_disable_reannounces_politely() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1", "disable light L1"]).unwrap();

        assert_eq!(
            d.protocol().calls,
            vec![
                Call::Handshake(vec![light()]),
                Call::Heartbeat(4001),
                Call::Disconnect(4000),
                Call::Handshake(vec![]),
                Call::Heartbeat(4003),
            ]
        );
        assert!(d.registry().is_empty());
    }

    #[test]
    fn sleep_sends_one_heartbeat_per_tick_plus_trailing() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1"]).unwrap();
        let before = d.protocol().calls.len();

        d.execute(&Command::Sleep(3)).unwrap();

        let calls = &d.protocol().calls[before..];
        // Three ticks, then the heartbeat every command ends with.
        assert_eq!(calls, vec![Call::Heartbeat(4001); 4].as_slice());
        assert_eq!(d.stats().handshakes, 1);
    }

    #[test]
    fn sleep_while_disconnected_does_nothing() {
        let mut d = driver(MockProtocol::default());
        d.run(["sleep 3"]).unwrap();
        assert!(d.protocol().calls.is_empty());
        assert_eq!(d.stats().commands, 1);
    }

    #[test]
    fn heartbeat_timeout_during_sleep_rehandshakes_once() {
        // enable's trailing beat, then tick 0 ok, tick 1 times out, tick 2 ok.
        let mut d = driver(MockProtocol::with_beats(&[
            Beat::Ok,
            Beat::Ok,
            Beat::Timeout,
            Beat::Ok,
        ]));
        d.run(["enable light L1", "sleep 3"]).unwrap();

        let p = d.protocol();
        assert_eq!(p.count(|c| matches!(c, Call::Handshake(_))), 2);
        assert_eq!(p.count(|c| matches!(c, Call::Disconnect(_))), 0);
        assert_eq!(
            &p.calls[3..],
            &[
                Call::Heartbeat(4001),
                Call::Handshake(vec![light()]),
                Call::Heartbeat(4003),
                Call::Heartbeat(4003),
            ]
        );
        assert_eq!(d.stats().recoveries, 1);
        assert!(d.is_connected());
    }

    #[test]
    fn trailing_heartbeat_timeout_rehandshakes() {
        let mut d = driver(MockProtocol::with_beats(&[Beat::Timeout]));
        d.run(["enable light L1"]).unwrap();
        assert_eq!(
            d.protocol().calls,
            vec![
                Call::Handshake(vec![light()]),
                Call::Heartbeat(4001),
                Call::Handshake(vec![light()]),
            ]
        );
    }

    #[test]
    fn other_heartbeat_errors_are_fatal() {
        let mut d = driver(MockProtocol::with_beats(&[Beat::Refused]));
        let err = d.run(["enable light L1", "sleep 5"]).unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
        assert_eq!(d.stats().commands, 1);
    }

    #[test]
    fn negative_die_horribly_fails_without_network() {
        let mut d = driver(MockProtocol::default());
        let err = d.run(["dieHorribly -5"]).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument(_)));
        assert!(d.protocol().calls.is_empty());
    }

    #[test]
    fn die_horribly_pauses_then_reannounces_without_disconnect() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1", "dieHorribly 2"]).unwrap();
        assert_eq!(
            &d.protocol().calls[2..],
            &[
                Call::Pause(Duration::from_secs(2)),
                Call::Handshake(vec![light()]),
                Call::Heartbeat(4003),
            ]
        );
    }

    #[test]
    fn disable_unknown_device_is_fatal_before_network() {
        let mut d = driver(MockProtocol::default());
        let err = d.run(["disable light L1"]).unwrap_err();
        assert!(matches!(err, SimError::NotFound { .. }));
        assert!(d.protocol().calls.is_empty());
    }

    #[test]
    fn comments_have_no_side_effects() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1"]).unwrap();
        let before = d.protocol().calls.len();
        d.run(["# just a note", ""]).unwrap();
        assert_eq!(d.protocol().calls.len(), before);
    }

    #[test]
    fn malformed_start_is_fatal() {
        let mut d = driver(MockProtocol {
            malformed_start: true,
            ..MockProtocol::default()
        });
        let err = d.run(["enable light L1", "sleep 1"]).unwrap_err();
        assert!(matches!(err, SimError::Protocol(_)));
        assert!(!d.is_connected());
    }

    #[test]
    fn session_left_open_at_end_by_default() {
        let mut d = driver(MockProtocol::default());
        d.run(["enable light L1"]).unwrap();
        assert_eq!(d.protocol().count(|c| matches!(c, Call::Disconnect(_))), 0);
        assert!(d.is_connected());
    }

    #[test]
    fn disconnect_on_exit_closes_last_session() {
        let mut d = ScriptDriver::new(
            MockProtocol::default(),
            Endpoint::new("localhost", 1870, 5001),
            DriverOptions {
                disconnect_on_exit: true,
            },
        );
        let stats = d.run(["enable light L1"]).unwrap();
        assert_eq!(d.protocol().calls.last(), Some(&Call::Disconnect(4000)));
        assert_eq!(*d.state(), LinkState::Disconnected);
        assert_eq!(stats.disconnects, 1);
    }

    #[test]
    fn stats_count_everything() {
        let mut d = driver(MockProtocol::default());
        let stats = d
            .run(["enable light L1", "enable sst S1", "# skip", "sleep 2"])
            .unwrap();
        assert_eq!(
            stats,
            RunStats {
                commands: 3,
                handshakes: 2,
                heartbeats: 5,
                disconnects: 1,
                recoveries: 0,
            }
        );
    }
}
