//! Error types for tactilink.

use std::io;
use thiserror::Error;

use crate::protocol::codec::DeviceError;

/// Result type for tactilink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tactilink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, local file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device never accepted the data-mode handshake.
    #[error("Handshake timed out: no DATA:OK after {attempts} attempt(s)")]
    HandshakeTimeout {
        /// Number of handshake attempts made.
        attempts: u32,
    },

    /// Filename cannot be represented as an 8.3 name. Never sent to the device.
    #[error("Invalid filename {name:?}: {reason}")]
    InvalidName {
        /// The rejected input.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Unknown bank name.
    #[error("Invalid bank {0:?} (expected human or generated)")]
    InvalidBank(String),

    /// Unknown key name.
    #[error("Invalid key {0:?} (expected A-Z, SHIFT, YES, NO, WATER, SPACE or PERIOD)")]
    InvalidKey(String),

    /// An expected response did not arrive within its deadline, or an
    /// out-of-sequence response was seen.
    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    /// The device reported an error token.
    #[error("Device reported {0}")]
    Device(DeviceError),

    /// The device rejected a write because writes are locked.
    #[error("Device writes are locked (ERR:WRITELOCK); enable them with FLAG ON")]
    WriteLocked,

    /// Downloaded bytes do not match the CRC32 announced by the device.
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// CRC32 announced by the device.
        expected: u32,
        /// CRC32 computed over the received bytes.
        actual: u32,
    },

    /// GET payload ended early: no byte arrived within the inactivity window.
    #[error("Short read: received {received} of {expected} bytes")]
    ShortRead {
        /// Size announced in the GET header.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// A hard reset failed; the session cannot be used any more.
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Communication timeout at the transport level.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or unexpected protocol data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation interrupted by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,

    /// No serial device found.
    #[error("Device not found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error leaves the line protocol misaligned, so that the
    /// session must be hard-reset before the next command.
    pub fn needs_resync(&self) -> bool {
        matches!(
            self,
            Self::ProtocolDesync(_) | Self::ShortRead { .. } | Self::Interrupted
        )
    }

    /// Whether the device reported that the requested file or directory
    /// does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Device(DeviceError::NotFound(_) | DeviceError::NoDir)
        )
    }
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::WriteLock => Self::WriteLocked,
            other => Self::Device(other),
        }
    }
}
