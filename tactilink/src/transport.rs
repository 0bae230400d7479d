//! Line and byte framing over a [`Port`].
//!
//! The transport keeps its own receive buffer so that a line read never
//! swallows payload bytes that follow it (GET headers are immediately
//! followed by raw data). Every read takes an explicit timeout; nothing here
//! retries.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::port::Port;

/// Size of a single read from the port.
const READ_CHUNK: usize = 256;

/// Buffered line/byte transport.
pub struct Transport<P: Port> {
    port: P,
    pending: VecDeque<u8>,
}

#[cfg(feature = "native")]
impl Transport<crate::port::NativePort> {
    /// Open a native serial port.
    ///
    /// DTR is asserted so boards that reset on DTR come up; callers should
    /// allow for the boot delay before the handshake.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let mut port = crate::port::NativePort::open_simple(port_name, baud_rate)?;
        port.set_dtr(true)?;
        Ok(Self::new(port))
    }
}

impl<P: Port> Transport<P> {
    /// Wrap an already-open port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: VecDeque::new(),
        }
    }

    /// The underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The underlying port, mutably.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Release the port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Send one line; the `\n` terminator is appended.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        trace!("TX line: {text}");
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.port.write_all_bytes(&line)
    }

    /// Send raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("TX {} bytes", bytes.len());
        self.port.write_all_bytes(bytes)
    }

    /// Read one line, stripped of trailing CR/LF.
    ///
    /// Returns `Ok(None)` if no complete line arrives within `timeout`; any
    /// partial line stays buffered.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                trace!("RX line: {line}");
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Read a single byte.
    pub fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(b) = self.pending.pop_front() {
                return Ok(Some(b));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Read whatever is available into `buf`, waiting up to `timeout` for
    /// the first byte. Returns 0 on timeout.
    pub fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                for (slot, b) in buf.iter_mut().zip(self.pending.drain(..n)) {
                    *slot = b;
                }
                return Ok(n);
            }
            if buf.is_empty() || Instant::now() >= deadline {
                return Ok(0);
            }
            self.fill()?;
        }
    }

    /// Read exactly `n` bytes.
    ///
    /// `idle` is an inactivity window: the deadline moves forward whenever
    /// bytes arrive. Fails with [`Error::Timeout`] if the stream stalls.
    pub fn read_exact(&mut self, n: usize, idle: Duration) -> Result<Vec<u8>> {
        let mut data = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = self.read_some(&mut data[filled..], idle)?;
            if got == 0 {
                return Err(Error::Timeout(format!(
                    "read_exact: {filled} of {n} bytes before {}ms of silence",
                    idle.as_millis()
                )));
            }
            filled += got;
        }
        Ok(data)
    }

    /// Discard buffered and incoming bytes until the line has been quiet for
    /// `quiet`, or `max` has elapsed. Returns the number of bytes dropped.
    pub fn drain(&mut self, quiet: Duration, max: Duration) -> Result<usize> {
        let start = Instant::now();
        let mut dropped = self.pending.len();
        self.pending.clear();
        let mut last_rx = Instant::now();

        while start.elapsed() < max && last_rx.elapsed() < quiet {
            if self.fill()? > 0 {
                dropped += self.pending.len();
                self.pending.clear();
                last_rx = Instant::now();
            }
        }

        if dropped > 0 {
            debug!("Drained {dropped} stale byte(s)");
        }
        Ok(dropped)
    }

    /// One read from the port into the pending buffer.
    ///
    /// Timeouts surface as zero bytes; the port's own read timeout bounds
    /// the call.
    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                self.pending.extend(&chunk[..n]);
                Ok(n)
            },
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            },
            Err(e) => Err(Error::Io(e)),
        }
    }
}
