//! # tactilink
//!
//! Serial filesystem transfer for an audio communication aid.
//!
//! The device keeps its audio clips on an SD card, one directory per bank
//! (`HUMAN` recordings, `GENERA~1` synthesized speech) and key (`A`-`Z`,
//! `SHIFT`, `YES`, `NO`, `WATER`, `SPACE`, `PERIOD`). Over USB serial it
//! speaks a line-oriented "data mode" protocol with raw binary payloads.
//! This crate provides:
//!
//! - A buffered line/byte [`Transport`] over any [`Port`]
//! - The wire codec, 8.3 filename normalization and CRC32
//! - A [`Session`] with handshake, STATUS/STAT/FLAG and hard reset
//! - Windowed PUT and inactivity-bounded GET
//! - Directory listing and deletion
//! - A [`ResyncController`] that realigns a desynced line and retries once
//! - A size-based sync planner for folders of clips
//! - A [`Client`] tying it all together
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: `Serialize` for listings, reports and discovered ports
//!
//! ## Example
//!
//! ```rust,no_run
//! use tactilink::{Bank, Client, Key, ProtocolConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut client = Client::open("/dev/ttyACM0", 115_200, ProtocolConfig::default())?;
//!         let key: Key = "shift".parse()?;
//!
//!         client.put(Bank::Human, key, "001.mp3", &std::fs::read("shift.mp3")?)?;
//!         for entry in client.list(Bank::Human, key)?.unwrap_or_default() {
//!             println!("{} {}", entry.name, entry.size);
//!         }
//!         client.close();
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod client;
pub mod config;
pub mod device;
pub mod directory;
pub mod error;
pub mod port;
pub mod protocol;
pub mod resync;
pub mod session;
pub mod sync;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). It is consulted
/// between PUT write quanta, between GET chunks and between sync items.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(feature = "native")]
pub use {device::auto_detect_port, port::NativePort};
pub use {
    client::Client,
    config::ProtocolConfig,
    device::{DetectedPort, DeviceKind, detect_compatible_ports, detect_ports, format_port_list},
    error::{Error, Result},
    port::{Port, SerialConfig},
    protocol::{Bank, DeviceError, Entry, FileName, Key, Space, StatusReport, crc32},
    resync::ResyncController,
    session::{Session, SessionState},
    sync::{ItemOutcome, NamingPolicy, SyncOptions, SyncPlan, SyncReport},
    transfer::PutSummary,
    transport::Transport,
};
