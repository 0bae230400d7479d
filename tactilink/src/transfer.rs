//! PUT and GET with windowed flow control.
//!
//! PUT streams the payload in write quanta and stops after every full
//! window until the device answers with a single ACK byte. GET reads the
//! announced number of bytes against an inactivity deadline that moves
//! forward whenever data arrives.

use std::time::Instant;

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::address::{Bank, Key};
use crate::protocol::codec::{ACK_BYTE, Command, Response};
use crate::protocol::crc::{Crc32, crc32};
use crate::protocol::name::FileName;
use crate::session::Session;

/// Chunk size for GET payload reads.
const GET_CHUNK: usize = 1024;

/// Upper bound on the buffer reserved before any GET payload arrives.
const GET_PREALLOC: usize = 1024 * 1024;

/// Result of a completed PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutSummary {
    /// Name the file was stored under.
    pub name: FileName,
    /// Payload size in bytes.
    pub size: u64,
    /// CRC32 sent with the header, if any.
    pub crc: Option<u32>,
    /// Flow-control window used.
    pub window: u32,
    /// Window acknowledgments received.
    pub acks: u32,
}

impl<P: Port> Session<P> {
    /// Upload `data` to `bank/key/name`. Does not retry.
    pub fn put_once<F>(
        &mut self,
        bank: Bank,
        key: Key,
        name: &FileName,
        data: &[u8],
        mut progress: F,
    ) -> Result<PutSummary>
    where
        F: FnMut(usize, usize),
    {
        let size = data.len() as u64;
        let crc = self.config().use_crc.then(|| crc32(data));

        self.send(&Command::Put {
            bank,
            key,
            name,
            size,
            crc,
        })?;

        let ready_timeout = self.config().ready_timeout(size);
        let window = match self.next_response(ready_timeout, "PUT:READY")? {
            Response::PutReady { window } => window
                .filter(|&w| w > 0)
                .unwrap_or(self.config().default_window),
            Response::Error(e) => return Err(e.into()),
            other => return Err(self.unexpected(&other, "PUT:READY")),
        };
        debug!("PUT {bank}/{key}/{name}: {size} bytes, window {window}");

        let acks = self.stream(data, window, &mut progress)?;

        let done_timeout = self.config().done_timeout(size);
        match self.next_response(done_timeout, "PUT:DONE")? {
            Response::PutDone => {
                info!("Stored {bank}/{key}/{name} ({size} bytes)");
                Ok(PutSummary {
                    name: name.clone(),
                    size,
                    crc,
                    window,
                    acks,
                })
            },
            Response::Error(e) => Err(e.into()),
            other => Err(self.unexpected(&other, "PUT:DONE")),
        }
    }

    fn stream(
        &mut self,
        data: &[u8],
        window: u32,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<u32> {
        let window = usize::try_from(window).unwrap_or(usize::MAX);
        let quantum = self.config().write_quantum.max(1);
        let total = data.len();
        let mut sent = 0;
        let mut in_window = 0;
        let mut acks = 0;

        progress(0, total);
        while sent < total {
            if crate::is_interrupted_requested() {
                self.mark_desynced();
                return Err(Error::Interrupted);
            }

            let len = quantum.min(window - in_window).min(total - sent);
            self.transport_mut().write_bytes(&data[sent..sent + len])?;
            sent += len;
            in_window += len;
            progress(sent, total);

            if in_window == window {
                self.await_ack(acks + 1)?;
                acks += 1;
                in_window = 0;
            }
        }
        Ok(acks)
    }

    /// Block until the window acknowledgment arrives.
    ///
    /// Anything other than the ACK byte is the start of a line; an error
    /// token there aborts the upload.
    fn await_ack(&mut self, window_no: u32) -> Result<()> {
        let timeout = self.config().ack_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.transport_mut().read_byte(left)? {
                Some(ACK_BYTE) => {
                    trace!("ACK for window {window_no}");
                    return Ok(());
                },
                Some(b'\r' | b'\n') => {},
                Some(first) => {
                    let rest = self
                        .transport_mut()
                        .read_line(timeout)?
                        .unwrap_or_default();
                    let line = format!("{}{rest}", char::from(first));
                    if let Response::Error(e) = Response::parse(&line) {
                        self.mark_desynced();
                        return Err(e.into());
                    }
                    trace!("Ignoring line while waiting for ACK: {line}");
                },
                None => {
                    self.mark_desynced();
                    return Err(Error::ProtocolDesync(format!(
                        "no ACK for window {window_no} within {}ms",
                        timeout.as_millis()
                    )));
                },
            }
        }
    }

    /// Download `bank/key/name`. Does not retry.
    ///
    /// `GET:NOK` is returned as a not-found device error and leaves the
    /// session aligned.
    pub fn get_once<F>(
        &mut self,
        bank: Bank,
        key: Key,
        name: &FileName,
        mut progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        self.send(&Command::Get { bank, key, name })?;

        let timeout = self.config().command_timeout;
        let (size, expected_crc) = match self.next_response(timeout, "GET:SIZE")? {
            Response::GetSize { size, crc } => (size, crc),
            Response::Error(e) => return Err(e.into()),
            other => return Err(self.unexpected(&other, "GET:SIZE")),
        };
        if let Some(space) = self.cached_space().filter(|space| size > space.total) {
            self.mark_desynced();
            return Err(Error::Protocol(format!(
                "GET size {size} exceeds card capacity {}",
                space.total
            )));
        }
        let total = usize::try_from(size).map_err(|_| {
            self.mark_desynced();
            Error::Protocol(format!("GET size {size} does not fit in memory"))
        })?;
        debug!("GET {bank}/{key}/{name}: {size} bytes");

        let idle = self.config().get_idle_timeout;
        // The announced size is untrusted; grow as bytes actually arrive.
        let mut data = Vec::with_capacity(total.min(GET_PREALLOC));
        let mut chunk = [0u8; GET_CHUNK];
        let mut crc = Crc32::new();

        progress(0, total);
        while data.len() < total {
            if crate::is_interrupted_requested() {
                self.mark_desynced();
                return Err(Error::Interrupted);
            }
            let want = GET_CHUNK.min(total - data.len());
            let n = self.transport_mut().read_some(&mut chunk[..want], idle)?;
            if n == 0 {
                self.mark_desynced();
                return Err(Error::ShortRead {
                    expected: size,
                    received: data.len() as u64,
                });
            }
            crc.update(&chunk[..n]);
            data.extend_from_slice(&chunk[..n]);
            progress(data.len(), total);
        }

        if let Some(expected) = expected_crc {
            let actual = crc.finalize();
            if actual != expected {
                return Err(Error::CrcMismatch { expected, actual });
            }
        }
        info!("Fetched {bank}/{key}/{name} ({size} bytes)");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::DeviceError;
    use crate::session::SessionState;
    use crate::testing::{ScriptedPort, SimDevice, fast_config};
    use crate::transport::Transport;

    fn open(device: SimDevice) -> Session<SimDevice> {
        Session::enter(Transport::new(device), fast_config()).unwrap()
    }

    fn name(s: &str) -> FileName {
        FileName::parse(s).unwrap()
    }

    fn key(s: &str) -> Key {
        s.parse().unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_put_windows_and_acks() {
        let mut session = open(SimDevice::new());
        let data = vec![0u8; 4096];
        let summary = session
            .put_once(Bank::Generated, key("A"), &name("005.mp3"), &data, |_, _| {})
            .unwrap();

        assert_eq!(summary.window, 512);
        assert_eq!(summary.acks, 8);
        assert_eq!(summary.crc, Some(crc32(&data)));

        let device = session.transport().port();
        let header = format!("PUT GENERA~1 A 005.MP3 4096 {}", crc32(&data));
        assert!(device.lines.contains(&header));
        assert_eq!(device.acks_sent, 8);
        assert_eq!(device.payload_writes.len(), 16);
        assert!(device.payload_writes.iter().all(|&n| n <= 256));
        assert_eq!(device.file("GENERA~1", "A", "005.MP3"), Some(&data[..]));
    }

    #[test]
    fn test_put_partial_last_window() {
        let mut session = open(SimDevice::new().with_window(300));
        let data = pattern(1000);
        let summary = session
            .put_once(Bank::Human, key("B"), &name("x.mp3"), &data, |_, _| {})
            .unwrap();
        assert_eq!(summary.window, 300);
        assert_eq!(summary.acks, 3);
        let device = session.transport().port();
        assert!(device.payload_writes.iter().all(|&n| n <= 256));
        assert_eq!(device.file("HUMAN", "B", "X.MP3"), Some(&data[..]));
    }

    #[test]
    fn test_put_without_window_uses_default() {
        let mut device = SimDevice::new();
        device.faults.omit_window = true;
        let mut session = open(device);
        let summary = session
            .put_once(Bank::Human, key("C"), &name("a.wav"), &pattern(1024), |_, _| {})
            .unwrap();
        assert_eq!(summary.window, 512);
        assert_eq!(summary.acks, 2);
    }

    #[test]
    fn test_put_empty_payload() {
        let mut session = open(SimDevice::new());
        let summary = session
            .put_once(Bank::Human, key("D"), &name("empty.mp3"), &[], |_, _| {})
            .unwrap();
        assert_eq!(summary.acks, 0);
        let device = session.transport().port();
        assert!(device.lines.contains(&"PUT HUMAN D EMPTY.MP3 0 0".to_string()));
        assert_eq!(device.file("HUMAN", "D", "EMPTY.MP3"), Some(&[][..]));
    }

    #[test]
    fn test_put_without_crc() {
        let mut config = fast_config();
        config.use_crc = false;
        let mut session = Session::enter(Transport::new(SimDevice::new()), config).unwrap();
        let summary = session
            .put_once(Bank::Human, key("E"), &name("n.mp3"), b"abc", |_, _| {})
            .unwrap();
        assert_eq!(summary.crc, None);
        assert!(
            session
                .transport()
                .port()
                .lines
                .contains(&"PUT HUMAN E N.MP3 3".to_string())
        );
    }

    #[test]
    fn test_put_progress_reaches_total() {
        let mut session = open(SimDevice::new());
        let mut seen = Vec::new();
        session
            .put_once(Bank::Human, key("F"), &name("p.mp3"), &pattern(700), |done, total| {
                seen.push((done, total));
            })
            .unwrap();
        assert_eq!(seen.first(), Some(&(0, 700)));
        assert_eq!(seen.last(), Some(&(700, 700)));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_put_corrupted_payload_reports_crc_error() {
        let mut device = SimDevice::new();
        device.faults.corrupt_next_put = true;
        let mut session = open(device);
        let err = session
            .put_once(Bank::Human, key("G"), &name("bad.mp3"), &pattern(600), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::Crc)));
        assert_eq!(session.state(), SessionState::Aligned);
        assert_eq!(session.transport().port().file("HUMAN", "G", "BAD.MP3"), None);
    }

    #[test]
    fn test_put_short_stream_never_completes() {
        let mut device = SimDevice::new();
        device.faults.drop_next_put_bytes = 10;
        let mut session = open(device);
        let err = session
            .put_once(Bank::Human, key("H"), &name("lost.mp3"), &pattern(1500), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::Timeout)));
        assert_eq!(session.state(), SessionState::Desynced);
        assert_eq!(session.transport().port().file("HUMAN", "H", "LOST.MP3"), None);
    }

    #[test]
    fn test_put_write_locked() {
        let mut session = open(SimDevice::new().with_writes_enabled(false));
        let err = session
            .put_once(Bank::Human, key("I"), &name("a.mp3"), b"x", |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::WriteLocked));
        assert_eq!(session.state(), SessionState::Aligned);
    }

    #[test]
    fn test_put_missing_ready_desyncs() {
        let mut device = SimDevice::new();
        device.faults.swallow_put_headers = 1;
        let mut session = open(device);
        let err = session
            .put_once(Bank::Human, key("J"), &name("a.mp3"), b"x", |_, _| {})
            .unwrap_err();
        assert!(err.needs_resync());
        assert_eq!(session.state(), SessionState::Desynced);
    }

    #[test]
    fn test_get_round_trip() {
        let mut session = open(SimDevice::new());
        let data = pattern(5000);
        session
            .put_once(Bank::Generated, key("SHIFT"), &name("001.mp3"), &data, |_, _| {})
            .unwrap();
        let mut last = (0, 0);
        let fetched = session
            .get_once(Bank::Generated, key("SHIFT"), &name("001.MP3"), |d, t| last = (d, t))
            .unwrap();
        assert_eq!(fetched, data);
        assert_eq!(last, (5000, 5000));
    }

    #[test]
    fn test_get_crc_matches_put_crc() {
        let mut session = open(SimDevice::new());
        let data = pattern(321);
        let summary = session
            .put_once(Bank::Human, key("K"), &name("c.mp3"), &data, |_, _| {})
            .unwrap();
        session.send(&Command::Get {
            bank: Bank::Human,
            key: key("K"),
            name: &name("c.mp3"),
        })
        .unwrap();
        let header = session.next_response(fast_config().command_timeout, "GET:SIZE").unwrap();
        assert_eq!(
            header,
            Response::GetSize {
                size: 321,
                crc: summary.crc
            }
        );
    }

    #[test]
    fn test_get_not_found_is_not_a_desync() {
        let mut session = open(SimDevice::new());
        let err = session
            .get_once(Bank::Human, key("L"), &name("nope.mp3"), |_, _| {})
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.needs_resync());
        assert_eq!(session.state(), SessionState::Aligned);
    }

    #[test]
    fn test_get_short_read() {
        let mut device = SimDevice::new();
        device.insert("HUMAN", "M", "A.MP3", &pattern(2000));
        device.faults.truncate_next_get = Some(700);
        let mut session = open(device);
        let err = session
            .get_once(Bank::Human, key("M"), &name("a.mp3"), |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                expected: 2000,
                received: 700
            }
        ));
        assert_eq!(session.state(), SessionState::Desynced);
    }

    #[test]
    fn test_get_crc_mismatch() {
        let mut device = SimDevice::new();
        device.insert("HUMAN", "N", "A.MP3", b"hello");
        device.faults.wrong_get_crc = true;
        let mut session = open(device);
        let err = session
            .get_once(Bank::Human, key("N"), &name("a.mp3"), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }));
        assert_eq!(session.state(), SessionState::Aligned);
    }

    #[test]
    fn test_get_huge_announced_size_is_a_short_read() {
        let port = ScriptedPort::new(
            b"DATA:OK v1\n[DATA] mode=ENTER\nGET:SIZE 18446744073709551615\nabc",
        );
        let mut session = Session::enter(Transport::new(port), fast_config()).unwrap();
        let err = session
            .get_once(Bank::Human, key("A"), &name("big.mp3"), |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                expected: u64::MAX,
                received: 3
            }
        ));
        assert_eq!(session.state(), SessionState::Desynced);
    }

    #[test]
    fn test_get_size_beyond_card_capacity_is_rejected() {
        let mut session = open(SimDevice::new());
        let total = session.stat().unwrap().total;
        session.transport_mut().port_mut().insert("HUMAN", "B", "A.MP3", b"x");
        session.transport_mut().port_mut().faults.announce_get_size = Some(total + 1);
        let err = session
            .get_once(Bank::Human, key("B"), &name("a.mp3"), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(session.state(), SessionState::Desynced);
    }

    #[test]
    fn test_put_storage_failures_are_reported_and_keep_alignment() {
        let cases = [
            ("ERR:WRITE", DeviceError::Write),
            ("ERR:RENAME", DeviceError::Rename),
            ("ERR:MKDIR", DeviceError::Mkdir),
        ];
        for (token, expected) in cases {
            let mut device = SimDevice::new();
            device.faults.terminal_error = Some(token);
            let mut session = open(device);
            let err = session
                .put_once(Bank::Human, key("O"), &name("a.mp3"), &pattern(900), |_, _| {})
                .unwrap_err();
            assert!(
                matches!(&err, Error::Device(e) if *e == expected),
                "{token}: {err:?}"
            );
            assert!(!err.needs_resync(), "{token}");
            assert_eq!(session.state(), SessionState::Aligned, "{token}");
            assert_eq!(session.transport().port().file("HUMAN", "O", "A.MP3"), None);
            // The line is still usable.
            assert!(session.status().is_ok(), "{token}");
        }
    }
}
