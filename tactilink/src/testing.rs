//! Test ports: a scripted byte stream and a simulated device.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::port::Port;
use crate::protocol::crc::crc32;

fn timed_out() -> io::Error {
    // Keep empty reads from spinning a core.
    std::thread::sleep(Duration::from_millis(1));
    io::Error::new(io::ErrorKind::TimedOut, "no data")
}

/// Protocol settings with short deadlines so failure paths stay fast.
///
/// Also routes library logs to the test harness (`RUST_LOG=trace`).
pub(crate) fn fast_config() -> ProtocolConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ProtocolConfig {
        handshake_timeout: Duration::from_millis(200),
        handshake_attempts: 2,
        info_line_timeout: Duration::from_millis(30),
        command_timeout: Duration::from_millis(200),
        exit_timeout: Duration::from_millis(100),
        ready_timeout_min: Duration::from_millis(100),
        done_timeout_min: Duration::from_millis(300),
        per_round_trip: Duration::from_millis(1),
        ack_timeout: Duration::from_millis(200),
        get_idle_timeout: Duration::from_millis(60),
        drain_quiet: Duration::from_millis(20),
        drain_max: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(200),
        ..ProtocolConfig::default()
    }
}

/// Port that replays fixed input and records everything written.
pub(crate) struct ScriptedPort {
    input: VecDeque<u8>,
    written: Vec<u8>,
}

impl ScriptedPort {
    pub(crate) fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            written: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.is_empty() {
            return Err(timed_out());
        }
        let n = buf.len().min(self.input.len());
        for (slot, b) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for ScriptedPort {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        115_200
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.input.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Misbehaviour to inject into a [`SimDevice`].
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Ignore this many PUT headers entirely (no reply).
    pub swallow_put_headers: u32,
    /// Ignore this many handshakes.
    pub silent_handshakes: u32,
    /// Send only this many payload bytes on the next GET.
    pub truncate_next_get: Option<usize>,
    /// Flip a byte of the next PUT payload before verifying it.
    pub corrupt_next_put: bool,
    /// Lose this many bytes of the next PUT payload.
    pub drop_next_put_bytes: usize,
    /// Reply `PUT:READY` without a window.
    pub omit_window: bool,
    /// Announce a different CRC on GET than the stored data has.
    pub wrong_get_crc: bool,
    /// Announce this size on GET instead of the stored length.
    pub announce_get_size: Option<u64>,
    /// Answer a fully received PUT with this token instead of `PUT:DONE`.
    pub terminal_error: Option<&'static str>,
}

struct Upload {
    dir: (String, String),
    name: String,
    size: usize,
    crc: Option<u32>,
    data: Vec<u8>,
    window: usize,
    in_window: usize,
    dropping: usize,
}

/// In-memory device speaking the data-mode protocol.
pub(crate) struct SimDevice {
    dirs: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
    line: Vec<u8>,
    tx: VecDeque<u8>,
    data_mode: bool,
    writes_enabled: bool,
    upload: Option<Upload>,
    last_rx: Instant,
    payload_timeout: Duration,
    window: usize,
    capacity: u64,
    pub faults: Faults,
    /// Every command line received, in order.
    pub lines: Vec<String>,
    /// ACK bytes sent during uploads.
    pub acks_sent: usize,
    /// Sizes of writes received while an upload was streaming.
    pub payload_writes: Vec<usize>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    pub(crate) fn new() -> Self {
        Self {
            dirs: BTreeMap::new(),
            line: Vec::new(),
            tx: VecDeque::new(),
            data_mode: false,
            writes_enabled: true,
            upload: None,
            last_rx: Instant::now(),
            payload_timeout: Duration::from_millis(40),
            window: 512,
            capacity: 32 * 1024 * 1024,
            faults: Faults::default(),
            lines: Vec::new(),
            acks_sent: 0,
            payload_writes: Vec::new(),
        }
    }

    pub(crate) fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub(crate) fn with_writes_enabled(mut self, enabled: bool) -> Self {
        self.writes_enabled = enabled;
        self
    }

    /// Create an empty directory.
    pub(crate) fn mkdir(&mut self, bank: &str, key: &str) {
        self.dirs
            .entry((bank.to_string(), key.to_string()))
            .or_default();
    }

    /// Store a file directly.
    pub(crate) fn insert(&mut self, bank: &str, key: &str, name: &str, data: &[u8]) {
        self.dirs
            .entry((bank.to_string(), key.to_string()))
            .or_default()
            .insert(name.to_string(), data.to_vec());
    }

    pub(crate) fn file(&self, bank: &str, key: &str, name: &str) -> Option<&[u8]> {
        self.dirs
            .get(&(bank.to_string(), key.to_string()))
            .and_then(|dir| dir.get(name))
            .map(Vec::as_slice)
    }

    pub(crate) fn file_count(&self, bank: &str, key: &str) -> usize {
        self.dirs
            .get(&(bank.to_string(), key.to_string()))
            .map_or(0, BTreeMap::len)
    }

    /// Number of received lines starting with `prefix`.
    pub(crate) fn count_lines(&self, prefix: &str) -> usize {
        self.lines.iter().filter(|l| l.starts_with(prefix)).count()
    }

    fn reply(&mut self, line: &str) {
        self.tx.extend(line.as_bytes());
        self.tx.push_back(b'\n');
    }

    fn used(&self) -> u64 {
        self.dirs
            .values()
            .flat_map(BTreeMap::values)
            .map(|data| data.len() as u64)
            .sum()
    }

    fn expire_upload(&mut self) {
        if self.upload.is_some() && self.last_rx.elapsed() > self.payload_timeout {
            self.upload = None;
            self.reply("ERR:TIMEOUT");
        }
    }

    fn receive(&mut self, byte: u8) {
        if let Some(upload) = self.upload.as_mut() {
            if upload.dropping > 0 {
                upload.dropping -= 1;
                return;
            }
            upload.data.push(byte);
            upload.in_window += 1;
            if upload.in_window == upload.window {
                upload.in_window = 0;
                self.acks_sent += 1;
                self.tx.push_back(b'>');
            }
            if self
                .upload
                .as_ref()
                .is_some_and(|u| u.data.len() == u.size)
            {
                self.finish_upload();
            }
            return;
        }

        if byte == b'\n' {
            let raw = std::mem::take(&mut self.line);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            self.handle_line(&line);
        } else {
            self.line.push(byte);
        }
    }

    fn finish_upload(&mut self) {
        let Some(mut upload) = self.upload.take() else {
            return;
        };
        if std::mem::take(&mut self.faults.corrupt_next_put) {
            match upload.data.first_mut() {
                Some(b) => *b ^= 0xFF,
                None => upload.data.push(0),
            }
        }
        if upload.data.len() != upload.size
            || upload.crc.is_some_and(|crc| crc32(&upload.data) != crc)
        {
            self.reply("ERR:CRC");
            return;
        }
        if let Some(token) = self.faults.terminal_error.take() {
            self.reply(token);
            return;
        }
        self.dirs
            .entry(upload.dir)
            .or_default()
            .insert(upload.name, upload.data);
        self.reply("PUT:DONE");
    }

    fn handle_line(&mut self, line: &str) {
        self.lines.push(line.to_string());

        if line.starts_with("^DATA?") {
            if self.faults.silent_handshakes > 0 {
                self.faults.silent_handshakes -= 1;
                return;
            }
            self.data_mode = true;
            self.reply("DATA:OK v1");
            self.reply("[DATA] mode=ENTER");
            return;
        }
        if !self.data_mode {
            return;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["EXIT"] => {
                self.data_mode = false;
                self.reply("DATA:BYE");
            },
            ["STATUS"] => {
                let writes = if self.writes_enabled { "ON" } else { "OFF" };
                self.reply(&format!("STATUS MODE=OPEN WRITES={writes}"));
            },
            ["STAT"] => {
                let free = self.capacity.saturating_sub(self.used());
                self.reply(&format!("STAT {} {free}", self.capacity));
            },
            ["FLAG", "ON"] => {
                self.writes_enabled = true;
                self.reply("FLAG:ON");
            },
            ["FLAG", "OFF"] => {
                self.writes_enabled = false;
                self.reply("FLAG:OFF");
            },
            ["FLAG", ..] => self.reply("FLAG:ERR"),
            ["LS", bank, key] => self.list(bank, key),
            ["PUT", bank, key, name, size, rest @ ..] if rest.len() <= 1 => {
                let crc = rest.first().map(|c| c.parse::<u32>());
                self.start_upload(bank, key, name, size.parse(), crc);
            },
            ["GET", bank, key, name] => self.send_file(bank, key, name),
            ["DEL", bank, key, name] => self.delete(bank, key, name),
            ["LS" | "PUT" | "GET" | "DEL", ..] => self.reply("ERR:ARGS"),
            _ => self.reply("ERR:UNKNOWN"),
        }
    }

    fn list(&mut self, bank: &str, key: &str) {
        let Some(dir) = self.dirs.get(&(bank.to_string(), key.to_string())) else {
            self.reply("LS:NODIR");
            return;
        };
        let lines: Vec<String> = dir
            .iter()
            .map(|(name, data)| format!("{name} {}", data.len()))
            .collect();
        for line in lines {
            self.reply(&line);
        }
        self.reply("LS:DONE");
    }

    fn start_upload(
        &mut self,
        bank: &str,
        key: &str,
        name: &str,
        size: std::result::Result<usize, std::num::ParseIntError>,
        crc: Option<std::result::Result<u32, std::num::ParseIntError>>,
    ) {
        if self.faults.swallow_put_headers > 0 {
            self.faults.swallow_put_headers -= 1;
            return;
        }
        if !self.writes_enabled {
            self.reply("ERR:WRITELOCK");
            return;
        }
        let (Ok(size), Ok(crc)) = (size, crc.transpose()) else {
            self.reply("ERR:ARGS");
            return;
        };

        self.upload = Some(Upload {
            dir: (bank.to_string(), key.to_string()),
            name: name.to_string(),
            size,
            crc,
            data: Vec::with_capacity(size),
            window: self.window,
            in_window: 0,
            dropping: std::mem::take(&mut self.faults.drop_next_put_bytes),
        });
        if self.faults.omit_window {
            self.reply("PUT:READY");
        } else {
            self.reply(&format!("PUT:READY {}", self.window));
        }
        if size == 0 {
            self.finish_upload();
        }
    }

    fn send_file(&mut self, bank: &str, key: &str, name: &str) {
        let Some(data) = self.file(bank, key, name).map(<[u8]>::to_vec) else {
            self.reply("GET:NOK");
            return;
        };
        let mut crc = crc32(&data);
        if self.faults.wrong_get_crc {
            crc ^= 1;
        }
        let announced = self
            .faults
            .announce_get_size
            .take()
            .unwrap_or(data.len() as u64);
        self.reply(&format!("GET:SIZE {announced} {crc}"));
        let sent = self
            .faults
            .truncate_next_get
            .take()
            .map_or(data.len(), |n| n.min(data.len()));
        self.tx.extend(&data[..sent]);
    }

    fn delete(&mut self, bank: &str, key: &str, name: &str) {
        if !self.writes_enabled {
            self.reply("ERR:WRITELOCK");
            return;
        }
        let removed = self
            .dirs
            .get_mut(&(bank.to_string(), key.to_string()))
            .and_then(|dir| dir.remove(name))
            .is_some();
        self.reply(if removed { "DEL:OK" } else { "DEL:NOK" });
    }
}

impl Read for SimDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.expire_upload();
        if self.tx.is_empty() {
            return Err(timed_out());
        }
        let n = buf.len().min(self.tx.len());
        for (slot, b) in buf.iter_mut().zip(self.tx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for SimDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.expire_upload();
        self.last_rx = Instant::now();
        if self.upload.is_some() {
            self.payload_writes.push(buf.len());
        }
        for &b in buf {
            self.receive(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for SimDevice {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        115_200
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.tx.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "sim"
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
