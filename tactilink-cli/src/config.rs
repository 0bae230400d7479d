//! Configuration file support for tactilink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (TACTILINK_*)
//! 3. Local config file (./tactilink.toml or ./tactilink_ports.toml)
//! 4. Global config file (~/.config/tactilink/config.toml)

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tactilink::ProtocolConfig;

const LOCAL_CONFIG: &str = "tactilink.toml";
const LOCAL_PORTS: &str = "tactilink_ports.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// `[transfer]` table. Durations are in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferSettings {
    /// Wait for `DATA:OK` per attempt.
    pub handshake_timeout_ms: Option<u64>,
    /// Handshake attempts before giving up.
    pub handshake_attempts: Option<u32>,
    /// Wait for single-line replies.
    pub command_timeout_ms: Option<u64>,
    /// Wait for each flow-control ACK.
    pub ack_timeout_ms: Option<u64>,
    /// GET inactivity window.
    pub get_idle_timeout_ms: Option<u64>,
    /// Lower bound for the `PUT:READY` wait.
    pub ready_timeout_min_ms: Option<u64>,
    /// Lower bound for the `PUT:DONE` wait.
    pub done_timeout_min_ms: Option<u64>,
    /// Flow window assumed when the device does not announce one.
    pub window: Option<u32>,
    /// Bytes per serial write while streaming a PUT.
    pub write_quantum: Option<usize>,
    /// Send a CRC32 with each PUT.
    pub use_crc: Option<bool>,
    /// Resync retries per operation.
    pub max_retries: Option<u32>,
}

/// `[sync]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    /// Default file extension for folder sync.
    pub ext: Option<String>,
    /// Stop a sync at the first failed upload.
    #[serde(default)]
    pub stop_on_error: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Protocol tunables.
    #[serde(default)]
    pub transfer: TransferSettings,
    /// Folder sync defaults.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        if let Some(ports_config) = Self::load_ports_config() {
            config.port = ports_config;
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike the implicit files, an explicitly named file must exist and parse.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let config =
            toml::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    fn load_ports_config() -> Option<PortConfig> {
        let mut candidates = vec![PathBuf::from(LOCAL_PORTS)];
        if let Some(global_dir) = Self::global_config_dir() {
            candidates.push(global_dir.join("ports.toml"));
        }

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match fs::read_to_string(&path).map(|content| toml::from_str::<PortConfig>(&content)) {
                Ok(Ok(config)) => {
                    debug!("Loaded ports config from {}", path.display());
                    return Some(config);
                },
                Ok(Err(e)) => warn!("Failed to parse ports file {}: {e}", path.display()),
                Err(e) => warn!("Failed to read ports file {}: {e}", path.display()),
            }
        }

        None
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tactilink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn merge(&mut self, other: Self) {
        if other.port.connection.serial.is_some() {
            self.port.connection.serial = other.port.connection.serial;
        }
        if other.port.connection.baud.is_some() {
            self.port.connection.baud = other.port.connection.baud;
        }
        self.port.usb_device.extend(other.port.usb_device);

        let t = other.transfer;
        let mine = &mut self.transfer;
        macro_rules! take {
            ($($field:ident),*) => {
                $(if t.$field.is_some() { mine.$field = t.$field; })*
            };
        }
        take!(
            handshake_timeout_ms,
            handshake_attempts,
            command_timeout_ms,
            ack_timeout_ms,
            get_idle_timeout_ms,
            ready_timeout_min_ms,
            done_timeout_min_ms,
            window,
            write_quantum,
            use_crc,
            max_retries
        );

        if other.sync.ext.is_some() {
            self.sync.ext = other.sync.ext;
        }
        if other.sync.stop_on_error {
            self.sync.stop_on_error = true;
        }
    }

    /// Build the library protocol configuration from `[transfer]`.
    pub fn protocol_config(&self) -> Result<ProtocolConfig, String> {
        let t = &self.transfer;
        let mut config = ProtocolConfig::default();
        let ms = Duration::from_millis;

        if let Some(v) = t.handshake_timeout_ms {
            config.handshake_timeout = ms(v);
        }
        if let Some(v) = t.handshake_attempts {
            if v == 0 {
                return Err("transfer.handshake_attempts must be at least 1".into());
            }
            config.handshake_attempts = v;
        }
        if let Some(v) = t.command_timeout_ms {
            config.command_timeout = ms(v);
        }
        if let Some(v) = t.ack_timeout_ms {
            config.ack_timeout = ms(v);
        }
        if let Some(v) = t.get_idle_timeout_ms {
            config.get_idle_timeout = ms(v);
        }
        if let Some(v) = t.ready_timeout_min_ms {
            config.ready_timeout_min = ms(v);
        }
        if let Some(v) = t.done_timeout_min_ms {
            config.done_timeout_min = ms(v);
        }
        if let Some(v) = t.window {
            if v == 0 {
                return Err("transfer.window must be greater than 0".into());
            }
            config.default_window = v;
        }
        if let Some(v) = t.write_quantum {
            if v == 0 {
                return Err("transfer.write_quantum must be greater than 0".into());
            }
            config.write_quantum = v;
        }
        if let Some(v) = t.use_crc {
            config.use_crc = v;
        }
        if let Some(v) = t.max_retries {
            config.max_retries = v;
        }

        Ok(config)
    }

    /// Save USB device for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };

        if self.port.usb_device.contains(&device) {
            return Ok(());
        }

        // Prefer a local file when the working directory already has one.
        let path = if Path::new(LOCAL_PORTS).exists() || Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_PORTS)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("ports.toml")
        } else {
            PathBuf::from(LOCAL_PORTS)
        };

        self.port.usb_device.push(device);

        let content = toml::to_string_pretty(&self.port)?;
        fs::write(&path, content)?;
        info!("Saved USB device to {}", path.display());

        Ok(())
    }
}
