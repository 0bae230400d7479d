//! Wire protocol: addressing, filenames, line codec and checksums.

pub mod address;
pub mod codec;
pub mod crc;
pub mod name;

pub use address::{Bank, Key, Letter};
pub use codec::{
    ACK_BYTE, Command, DeviceError, Entry, HANDSHAKE, PROBE, PROTOCOL_VERSION, Response, Space,
    StatusReport,
};
pub use crc::{Crc32, crc32};
pub use name::FileName;
