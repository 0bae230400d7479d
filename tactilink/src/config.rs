//! Protocol tunables.

use std::time::Duration;

/// Timeouts, flow-control and retry settings for a session.
///
/// Every deadline the engine waits on comes from here; nothing is hard-coded
/// in the protocol layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// How long to wait for `DATA:OK` after each handshake attempt.
    pub handshake_timeout: Duration,
    /// Handshake attempts before giving up (input is drained between them).
    pub handshake_attempts: u32,
    /// Grace period for the informational line after `DATA:OK`.
    pub info_line_timeout: Duration,
    /// Deadline for single-line replies (STATUS, STAT, FLAG, DEL, GET header, LS lines).
    pub command_timeout: Duration,
    /// Deadline for `DATA:BYE`.
    pub exit_timeout: Duration,
    /// Minimum wait for `PUT:READY`.
    pub ready_timeout_min: Duration,
    /// Minimum wait for the PUT terminal line.
    pub done_timeout_min: Duration,
    /// Extra wait per flow-control round trip for the scaled PUT deadlines.
    pub per_round_trip: Duration,
    /// Deadline for each window acknowledgment byte.
    pub ack_timeout: Duration,
    /// GET payload inactivity window; the deadline extends whenever bytes arrive.
    pub get_idle_timeout: Duration,
    /// Window assumed when `PUT:READY` carries none.
    pub default_window: u32,
    /// Largest single write during PUT streaming.
    pub write_quantum: usize,
    /// Send a CRC32 in PUT headers.
    pub use_crc: bool,
    /// Retries after a hard reset. The controller never exceeds this.
    pub max_retries: u32,
    /// Quiet period that ends an input drain.
    pub drain_quiet: Duration,
    /// Upper bound on a single input drain.
    pub drain_max: Duration,
    /// Deadline for `ERR:UNKNOWN` in reply to the realignment probe.
    pub probe_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            handshake_attempts: 2,
            info_line_timeout: Duration::from_millis(300),
            command_timeout: Duration::from_secs(5),
            exit_timeout: Duration::from_secs(3),
            ready_timeout_min: Duration::from_secs(3),
            done_timeout_min: Duration::from_secs(10),
            per_round_trip: Duration::from_millis(50),
            ack_timeout: Duration::from_secs(3),
            get_idle_timeout: Duration::from_secs(2),
            default_window: 512,
            write_quantum: 256,
            use_crc: true,
            max_retries: 1,
            drain_quiet: Duration::from_millis(100),
            drain_max: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl ProtocolConfig {
    /// Flow-control round trips needed for `size` bytes.
    pub fn round_trips(&self, size: u64) -> u32 {
        let window = u64::from(self.default_window.max(1));
        u32::try_from(size.div_ceil(window)).unwrap_or(u32::MAX)
    }

    /// Deadline for `PUT:READY` on a payload of `size` bytes.
    pub fn ready_timeout(&self, size: u64) -> Duration {
        self.scaled(self.ready_timeout_min, size)
    }

    /// Deadline for the PUT terminal line on a payload of `size` bytes.
    pub fn done_timeout(&self, size: u64) -> Duration {
        self.scaled(self.done_timeout_min, size)
    }

    fn scaled(&self, min: Duration, size: u64) -> Duration {
        self.per_round_trip
            .saturating_mul(self.round_trips(size))
            .max(min)
    }
}
