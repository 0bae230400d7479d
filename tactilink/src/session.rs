//! Data-mode session: handshake, state queries and hard reset.
//!
//! A [`Session`] is created by a successful handshake and owns the
//! transport for its lifetime. Any missing or out-of-sequence response moves
//! it to [`SessionState::Desynced`]; from there only [`Session::hard_reset`]
//! brings it back.

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::codec::{ACK_BYTE, Command, DeviceError, Response, Space, StatusReport};
use crate::transport::Transport;

/// Line alignment of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Commands and responses are paired.
    Aligned,
    /// A response went missing or arrived out of order; a hard reset is
    /// required before the next command.
    Desynced,
    /// A hard reset failed. The transport must be closed and reopened.
    Lost,
}

/// An open data-mode session.
pub struct Session<P: Port> {
    transport: Transport<P>,
    config: ProtocolConfig,
    version: String,
    state: SessionState,
    writes_enabled: Option<bool>,
    space: Option<Space>,
}

impl<P: Port> Session<P> {
    /// Perform the handshake and enter data mode.
    pub fn enter(mut transport: Transport<P>, config: ProtocolConfig) -> Result<Self> {
        let version = handshake(&mut transport, &config)?;
        info!("Entered data mode (protocol {version})");
        Ok(Self {
            transport,
            config,
            version,
            state: SessionState::Aligned,
            writes_enabled: None,
            space: None,
        })
    }

    /// Protocol version reported by the device.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current alignment state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Protocol settings in use.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Transport<P> {
        &self.transport
    }

    /// Writes-enabled flag from the last STATUS, if still considered valid.
    pub fn cached_writes_enabled(&self) -> Option<bool> {
        self.writes_enabled
    }

    /// Capacity from the last STAT.
    pub fn cached_space(&self) -> Option<Space> {
        self.space
    }

    /// Query the device status.
    pub fn status(&mut self) -> Result<StatusReport> {
        self.send(&Command::Status)?;
        match self.next_response(self.config.command_timeout, "STATUS")? {
            Response::Status(report) => {
                self.writes_enabled = Some(report.writes_enabled);
                Ok(report)
            },
            Response::Error(e) => Err(e.into()),
            other => Err(self.unexpected(&other, "STATUS")),
        }
    }

    /// Query storage capacity.
    pub fn stat(&mut self) -> Result<Space> {
        self.send(&Command::Stat)?;
        match self.next_response(self.config.command_timeout, "STAT")? {
            Response::Stat(space) => {
                self.space = Some(space);
                Ok(space)
            },
            Response::Error(e) => Err(e.into()),
            other => Err(self.unexpected(&other, "STAT")),
        }
    }

    /// Set the persisted write-permission marker.
    ///
    /// The cached status is dropped; query [`Session::status`] to observe
    /// the new state.
    pub fn flag(&mut self, on: bool) -> Result<()> {
        self.send(&Command::Flag(on))?;
        self.writes_enabled = None;
        match self.next_response(self.config.command_timeout, "FLAG")? {
            Response::Flag(state) if state == on => {
                debug!("Write flag set {}", if on { "ON" } else { "OFF" });
                Ok(())
            },
            // A well-formed reply with the wrong state keeps the line aligned.
            Response::Flag(state) => Err(Error::Protocol(format!(
                "asked for FLAG {}, device reported {}",
                if on { "ON" } else { "OFF" },
                if state { "ON" } else { "OFF" }
            ))),
            Response::Error(e) => Err(e.into()),
            other => Err(self.unexpected(&other, "FLAG")),
        }
    }

    /// Leave data mode and hand back the transport.
    ///
    /// A missing `DATA:BYE` is logged, never fatal.
    pub fn exit(mut self) -> Transport<P> {
        if self.state == SessionState::Lost {
            return self.transport;
        }
        if let Err(e) = self.transport.write_line(&Command::Exit.encode()) {
            warn!("Failed to send EXIT: {e}");
            return self.transport;
        }
        if wait_for_bye(&mut self.transport, self.config.exit_timeout) {
            info!("Left data mode");
        } else {
            warn!("No DATA:BYE after EXIT");
        }
        self.transport
    }

    /// Realign the line protocol.
    ///
    /// Drains input, leaves data mode, redoes the handshake and requires
    /// `ERR:UNKNOWN` in reply to an unknown command. On failure the session
    /// becomes [`SessionState::Lost`].
    pub fn hard_reset(&mut self) -> Result<()> {
        warn!("Hard reset: resynchronizing with device");
        match self.realign() {
            Ok(version) => {
                self.version = version;
                self.state = SessionState::Aligned;
                self.writes_enabled = None;
                self.space = None;
                info!("Hard reset complete; line protocol realigned");
                Ok(())
            },
            Err(e) => {
                self.state = SessionState::Lost;
                Err(Error::SessionLost(e.to_string()))
            },
        }
    }

    fn realign(&mut self) -> Result<String> {
        let (quiet, max) = (self.config.drain_quiet, self.config.drain_max);
        self.transport.drain(quiet, max)?;

        self.transport.write_line(&Command::Exit.encode())?;
        if !wait_for_bye(&mut self.transport, self.config.exit_timeout) {
            debug!("No DATA:BYE during hard reset");
        }

        let version = handshake(&mut self.transport, &self.config)?;

        self.transport.write_line(&Command::Probe.encode())?;
        let deadline = Instant::now() + self.config.probe_timeout;
        while let Some(line) = self.transport.read_line(remaining(deadline))? {
            if Response::parse(&line) == Response::Error(DeviceError::UnknownCommand) {
                return Ok(version);
            }
            trace!("Skipping line while probing: {line}");
        }
        Err(Error::Timeout("no ERR:UNKNOWN in reply to probe".into()))
    }

    /// Send a command; refuses unless the session is aligned.
    pub(crate) fn send(&mut self, command: &Command<'_>) -> Result<()> {
        match self.state {
            SessionState::Aligned => self.transport.write_line(&command.encode()),
            SessionState::Desynced => Err(Error::ProtocolDesync(
                "hard reset required before the next command".into(),
            )),
            SessionState::Lost => Err(Error::SessionLost("hard reset failed earlier".into())),
        }
    }

    /// Wait for the next meaningful response, skipping chatter.
    ///
    /// A missing response marks the session desynced.
    pub(crate) fn next_response(&mut self, timeout: Duration, waiting_for: &str) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(line) = self.transport.read_line(remaining(deadline))? else {
                self.state = SessionState::Desynced;
                return Err(Error::ProtocolDesync(format!(
                    "no {waiting_for} within {}ms",
                    timeout.as_millis()
                )));
            };
            // Tolerate an ACK byte left in front of a line.
            let line = line.trim_start_matches(char::from(ACK_BYTE));
            match Response::parse(line) {
                Response::Info(text) => {
                    if !text.is_empty() {
                        trace!("Ignoring line while waiting for {waiting_for}: {text}");
                    }
                },
                response => return Ok(response),
            }
        }
    }

    /// Record an out-of-sequence response.
    pub(crate) fn unexpected(&mut self, response: &Response, waiting_for: &str) -> Error {
        self.state = SessionState::Desynced;
        Error::ProtocolDesync(format!("expected {waiting_for}, got {response:?}"))
    }

    pub(crate) fn mark_desynced(&mut self) {
        self.state = SessionState::Desynced;
    }

    pub(crate) fn transport_mut(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }
}

/// Send the handshake and wait for `DATA:OK`, retrying after a drain.
fn handshake<P: Port>(transport: &mut Transport<P>, config: &ProtocolConfig) -> Result<String> {
    let attempts = config.handshake_attempts.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 {
            debug!("Handshake attempt {attempt}/{attempts}");
            transport.drain(config.drain_quiet, config.drain_max)?;
        }
        transport.write_line(&Command::Handshake.encode())?;

        let deadline = Instant::now() + config.handshake_timeout;
        while let Some(line) = transport.read_line(remaining(deadline))? {
            if let Response::DataOk(version) = Response::parse(&line) {
                if let Some(info) = transport.read_line(config.info_line_timeout)? {
                    debug!("Device: {info}");
                }
                return Ok(version);
            }
            trace!("Skipping line during handshake: {line}");
        }
    }
    Err(Error::HandshakeTimeout { attempts })
}

fn wait_for_bye<P: Port>(transport: &mut Transport<P>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while let Ok(Some(line)) = transport.read_line(remaining(deadline)) {
        if Response::parse(&line) == Response::DataBye {
            return true;
        }
    }
    false
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
