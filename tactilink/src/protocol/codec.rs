//! Line framing for the data-mode protocol.
//!
//! Every command and response is one ASCII line terminated by `\n`. Binary
//! payloads (PUT and GET bodies) follow a header line and are never part of
//! a line themselves.
//!
//! ```text
//! client                              device
//!   ^DATA? v1                 ->
//!                             <-      DATA:OK v1
//!   PUT GENERA~1 A 005.MP3 4096 <crc> ->
//!                             <-      PUT:READY 512
//!   <512 bytes>               ->
//!                             <-      '>'            (one per window)
//!   ...
//!                             <-      PUT:DONE
//! ```

use std::fmt;

use crate::protocol::address::{Bank, Key};
use crate::protocol::name::FileName;

/// Handshake line that asks the device to enter data mode.
pub const HANDSHAKE: &str = "^DATA? v1";

/// Protocol version requested in the handshake.
pub const PROTOCOL_VERSION: &str = "v1";

/// Flow-control acknowledgment byte sent after each window.
pub const ACK_BYTE: u8 = b'>';

/// Command the device does not know, used to prove line alignment.
pub const PROBE: &str = "NOOP";

/// A client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `^DATA? v1`
    Handshake,
    /// `EXIT`
    Exit,
    /// `STATUS`
    Status,
    /// `STAT`
    Stat,
    /// `FLAG ON` / `FLAG OFF`
    Flag(bool),
    /// `LS <bank> <key>`
    List {
        /// Bank.
        bank: Bank,
        /// Key.
        key: Key,
    },
    /// `PUT <bank> <key> <name> <size> [<crc32>]`
    Put {
        /// Bank.
        bank: Bank,
        /// Key.
        key: Key,
        /// Target filename.
        name: &'a FileName,
        /// Exact payload size in bytes.
        size: u64,
        /// CRC32 of the payload, if verification is requested.
        crc: Option<u32>,
    },
    /// `GET <bank> <key> <name>`
    Get {
        /// Bank.
        bank: Bank,
        /// Key.
        key: Key,
        /// Filename.
        name: &'a FileName,
    },
    /// `DEL <bank> <key> <name>`
    Delete {
        /// Bank.
        bank: Bank,
        /// Key.
        key: Key,
        /// Filename.
        name: &'a FileName,
    },
    /// An intentionally unknown command.
    Probe,
}

impl Command<'_> {
    /// Encode the command as a line, without the terminator.
    pub fn encode(&self) -> String {
        match *self {
            Self::Handshake => HANDSHAKE.to_string(),
            Self::Exit => "EXIT".to_string(),
            Self::Status => "STATUS".to_string(),
            Self::Stat => "STAT".to_string(),
            Self::Flag(on) => format!("FLAG {}", if on { "ON" } else { "OFF" }),
            Self::List { bank, key } => format!("LS {} {}", bank.wire_name(), key),
            Self::Put {
                bank,
                key,
                name,
                size,
                crc,
            } => match crc {
                Some(crc) => format!("PUT {} {key} {name} {size} {crc}", bank.wire_name()),
                None => format!("PUT {} {key} {name} {size}", bank.wire_name()),
            },
            Self::Get { bank, key, name } => format!("GET {} {key} {name}", bank.wire_name()),
            Self::Delete { bank, key, name } => format!("DEL {} {key} {name}", bank.wire_name()),
            Self::Probe => PROBE.to_string(),
        }
    }
}

/// Error tokens reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// `ERR:CRC` - received payload failed CRC verification.
    Crc,
    /// `ERR:WRITE` - storage write failed.
    Write,
    /// `ERR:RENAME` - moving the temporary file into place failed.
    Rename,
    /// `ERR:MKDIR` - the target directory could not be created.
    Mkdir,
    /// `ERR:OPEN` - the file could not be opened.
    Open,
    /// `ERR:WRITELOCK` - writes are disabled on the device.
    WriteLock,
    /// `ERR:ARGS` - malformed command arguments.
    Args,
    /// `ERR:TIMEOUT` - the device gave up waiting for payload bytes.
    Timeout,
    /// `ERR:UNKNOWN` - command not recognized.
    UnknownCommand,
    /// `LS:NODIR` - directory absent.
    NoDir,
    /// `GET:NOK` / `DEL:NOK` - file absent.
    NotFound(String),
    /// Any other error token, verbatim.
    Other(String),
}

impl DeviceError {
    /// Classify an error token such as `ERR:CRC`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "ERR:CRC" => Self::Crc,
            "ERR:WRITE" => Self::Write,
            "ERR:RENAME" => Self::Rename,
            "ERR:MKDIR" => Self::Mkdir,
            "ERR:OPEN" => Self::Open,
            "ERR:WRITELOCK" => Self::WriteLock,
            "ERR:ARGS" => Self::Args,
            "ERR:TIMEOUT" => Self::Timeout,
            "ERR:UNKNOWN" => Self::UnknownCommand,
            "LS:NODIR" => Self::NoDir,
            "GET:NOK" | "DEL:NOK" => Self::NotFound(token.to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    /// The token as the device sent it.
    pub fn token(&self) -> &str {
        match self {
            Self::Crc => "ERR:CRC",
            Self::Write => "ERR:WRITE",
            Self::Rename => "ERR:RENAME",
            Self::Mkdir => "ERR:MKDIR",
            Self::Open => "ERR:OPEN",
            Self::WriteLock => "ERR:WRITELOCK",
            Self::Args => "ERR:ARGS",
            Self::Timeout => "ERR:TIMEOUT",
            Self::UnknownCommand => "ERR:UNKNOWN",
            Self::NoDir => "LS:NODIR",
            Self::NotFound(token) | Self::Other(token) => token,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// Filename as reported by the device.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

impl Entry {
    /// Parse a listing line: `<name> <size>` or the older `LS: <name> <size>`.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix("LS:").unwrap_or(line).trim();
        let mut parts = body.split_whitespace();
        let (Some(name), Some(size), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        let size = size.parse().ok()?;
        Some(Self {
            name: name.to_string(),
            size,
        })
    }
}

/// Parsed STATUS reply.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatusReport {
    /// Whether the device accepts writes.
    pub writes_enabled: bool,
    /// Operating mode reported by the device (e.g. `OPEN`), if present.
    pub mode: Option<String>,
}

impl StatusReport {
    fn parse(body: &str) -> Self {
        let mut writes_enabled = None;
        let mut mode = None;
        for field in body.split_whitespace() {
            match field.split_once('=') {
                Some(("WRITES", value)) => writes_enabled = Some(is_on(value)),
                Some(("MODE", value)) => mode = Some(value.to_string()),
                _ => {},
            }
        }
        Self {
            // Older firmware prints a bare ON/OFF token.
            writes_enabled: writes_enabled.unwrap_or_else(|| body.split_whitespace().any(is_on)),
            mode,
        }
    }
}

fn is_on(value: &str) -> bool {
    matches!(value, "ON" | "1" | "TRUE" | "YES")
}

/// Storage capacity reported by STAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Space {
    /// Total bytes.
    pub total: u64,
    /// Free bytes.
    pub free: u64,
}

/// A device response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `DATA:OK <version>`
    DataOk(String),
    /// `DATA:BYE`
    DataBye,
    /// `STATUS ...`
    Status(StatusReport),
    /// `STAT <total> <free>`
    Stat(Space),
    /// `FLAG:ON` / `FLAG:OFF`
    Flag(bool),
    /// `PUT:READY [<window>]`
    PutReady {
        /// Flow-control window announced by the device.
        window: Option<u32>,
    },
    /// `PUT:DONE`
    PutDone,
    /// `GET:SIZE <size> [<crc32>]`
    GetSize {
        /// Payload size that follows.
        size: u64,
        /// CRC32 of the payload, when the device provides it.
        crc: Option<u32>,
    },
    /// `LS:DONE`
    ListDone,
    /// `DEL:OK`
    DeleteOk,
    /// One listing entry.
    Entry(Entry),
    /// Any error token (`ERR:*`, `*:NOK`, `LS:NODIR`, `FLAG:ERR`).
    Error(DeviceError),
    /// Informational or unrecognized chatter.
    Info(String),
}

impl Response {
    /// Parse one line (already stripped of its terminator).
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match head {
            "DATA:OK" => Self::DataOk(args.first().unwrap_or(&PROTOCOL_VERSION).to_string()),
            "DATA:BYE" => Self::DataBye,
            "STATUS" if !args.is_empty() => Self::Status(StatusReport::parse(&args.join(" "))),
            "STAT" => match args.as_slice() {
                [total, free, ..] => match (total.parse(), free.parse()) {
                    (Ok(total), Ok(free)) => Self::Stat(Space { total, free }),
                    _ => Self::Info(line.to_string()),
                },
                _ => Self::Info(line.to_string()),
            },
            "FLAG:ON" => Self::Flag(true),
            "FLAG:OFF" => Self::Flag(false),
            "PUT:READY" => Self::PutReady {
                window: args.first().and_then(|w| w.parse().ok()),
            },
            "PUT:DONE" => Self::PutDone,
            "GET:SIZE" => match args.first().and_then(|s| s.parse().ok()) {
                Some(size) => Self::GetSize {
                    size,
                    crc: args.get(1).and_then(|c| parse_crc(c)),
                },
                None => Self::Info(line.to_string()),
            },
            "LS:DONE" => Self::ListDone,
            "DEL:OK" => Self::DeleteOk,
            "LS:NODIR" | "GET:NOK" | "DEL:NOK" => Self::Error(DeviceError::from_token(head)),
            token if token.starts_with("ERR:") || token.starts_with("FLAG:ERR") => {
                Self::Error(DeviceError::from_token(token))
            },
            _ => Entry::parse(line).map_or_else(|| Self::Info(line.to_string()), Self::Entry),
        }
    }
}

/// Parse a CRC field: decimal, or hexadecimal with a `0x` prefix.
fn parse_crc(field: &str) -> Option<u32> {
    match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => field.parse().ok(),
    }
}

/// Convenience wrapper around [`Response::parse`].
pub fn parse_response(line: &str) -> Response {
    Response::parse(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FileName {
        FileName::parse(s).unwrap()
    }

    #[test]
    fn test_encode_simple_commands() {
        assert_eq!(Command::Handshake.encode(), "^DATA? v1");
        assert_eq!(Command::Exit.encode(), "EXIT");
        assert_eq!(Command::Status.encode(), "STATUS");
        assert_eq!(Command::Stat.encode(), "STAT");
        assert_eq!(Command::Flag(true).encode(), "FLAG ON");
        assert_eq!(Command::Flag(false).encode(), "FLAG OFF");
        assert_eq!(Command::Probe.encode(), "NOOP");
    }

    #[test]
    fn test_encode_put_header() {
        let n = name("005.mp3");
        let put = Command::Put {
            bank: Bank::Generated,
            key: "a".parse().unwrap(),
            name: &n,
            size: 4096,
            crc: Some(3_735_928_559),
        };
        assert_eq!(put.encode(), "PUT GENERA~1 A 005.MP3 4096 3735928559");

        let no_crc = Command::Put {
            bank: Bank::Human,
            key: Key::Shift,
            name: &n,
            size: 0,
            crc: None,
        };
        assert_eq!(no_crc.encode(), "PUT HUMAN SHIFT 005.MP3 0");
    }

    #[test]
    fn test_encode_addressed_commands() {
        let n = name("shift.MP3");
        assert_eq!(
            Command::Get {
                bank: Bank::Human,
                key: Key::Period,
                name: &n
            }
            .encode(),
            "GET HUMAN PERIOD SHIFT.MP3"
        );
        assert_eq!(
            Command::Delete {
                bank: Bank::Generated,
                key: Key::Water,
                name: &n
            }
            .encode(),
            "DEL GENERA~1 WATER SHIFT.MP3"
        );
        assert_eq!(
            Command::List {
                bank: Bank::Human,
                key: "j".parse().unwrap()
            }
            .encode(),
            "LS HUMAN J"
        );
    }

    #[test]
    fn test_parse_handshake_responses() {
        assert_eq!(Response::parse("DATA:OK v1"), Response::DataOk("v1".into()));
        assert_eq!(Response::parse("DATA:OK"), Response::DataOk("v1".into()));
        assert_eq!(Response::parse("DATA:BYE"), Response::DataBye);
    }

    #[test]
    fn test_parse_put_ready() {
        assert_eq!(
            Response::parse("PUT:READY 512"),
            Response::PutReady { window: Some(512) }
        );
        assert_eq!(
            Response::parse("PUT:READY"),
            Response::PutReady { window: None }
        );
        assert_eq!(Response::parse("PUT:DONE"), Response::PutDone);
    }

    #[test]
    fn test_parse_get_size() {
        assert_eq!(
            Response::parse("GET:SIZE 4096 123"),
            Response::GetSize {
                size: 4096,
                crc: Some(123)
            }
        );
        assert_eq!(
            Response::parse("GET:SIZE 10 0xDEADBEEF"),
            Response::GetSize {
                size: 10,
                crc: Some(0xDEAD_BEEF)
            }
        );
        assert_eq!(
            Response::parse("GET:SIZE 0"),
            Response::GetSize { size: 0, crc: None }
        );
        assert!(matches!(
            Response::parse("GET:SIZE abc"),
            Response::Info(_)
        ));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            Response::parse("STATUS MODE=OPEN WRITES=ON"),
            Response::Status(StatusReport {
                writes_enabled: true,
                mode: Some("OPEN".into())
            })
        );
        assert_eq!(
            Response::parse("STATUS WRITES=OFF"),
            Response::Status(StatusReport {
                writes_enabled: false,
                mode: None
            })
        );
        assert_eq!(
            Response::parse("STATUS ON"),
            Response::Status(StatusReport {
                writes_enabled: true,
                mode: None
            })
        );
    }

    #[test]
    fn test_parse_stat() {
        assert_eq!(
            Response::parse("STAT 31914983424 31000000000"),
            Response::Stat(Space {
                total: 31_914_983_424,
                free: 31_000_000_000
            })
        );
        assert!(matches!(Response::parse("STAT x y"), Response::Info(_)));
    }

    #[test]
    fn test_parse_error_tokens() {
        assert_eq!(
            Response::parse("ERR:CRC"),
            Response::Error(DeviceError::Crc)
        );
        assert_eq!(
            Response::parse("ERR:WRITELOCK"),
            Response::Error(DeviceError::WriteLock)
        );
        assert_eq!(
            Response::parse("LS:NODIR"),
            Response::Error(DeviceError::NoDir)
        );
        assert_eq!(
            Response::parse("GET:NOK"),
            Response::Error(DeviceError::NotFound("GET:NOK".into()))
        );
        assert_eq!(
            Response::parse("FLAG:ERR"),
            Response::Error(DeviceError::Other("FLAG:ERR".into()))
        );
        assert_eq!(
            Response::parse("ERR:SOMETHING"),
            Response::Error(DeviceError::Other("ERR:SOMETHING".into()))
        );
    }

    #[test]
    fn test_parse_listing_lines() {
        assert_eq!(
            Response::parse("001.MP3 12345"),
            Response::Entry(Entry {
                name: "001.MP3".into(),
                size: 12345
            })
        );
        assert_eq!(
            Response::parse("LS: PLAYLIST.M3U 40"),
            Response::Entry(Entry {
                name: "PLAYLIST.M3U".into(),
                size: 40
            })
        );
        assert_eq!(Response::parse("LS:DONE"), Response::ListDone);
    }

    #[test]
    fn test_parse_chatter() {
        assert_eq!(
            Response::parse("[DATA] mode=ENTER"),
            Response::Info("[DATA] mode=ENTER".into())
        );
        assert_eq!(
            Response::parse("booting 3 modules"),
            Response::Info("booting 3 modules".into())
        );
    }

    #[test]
    fn test_device_error_token_roundtrip() {
        for token in [
            "ERR:CRC",
            "ERR:WRITE",
            "ERR:RENAME",
            "ERR:MKDIR",
            "ERR:OPEN",
            "ERR:WRITELOCK",
            "ERR:ARGS",
            "ERR:TIMEOUT",
            "ERR:UNKNOWN",
            "LS:NODIR",
            "DEL:NOK",
            "ERR:FOO",
        ] {
            assert_eq!(DeviceError::from_token(token).token(), token);
        }
    }
}
