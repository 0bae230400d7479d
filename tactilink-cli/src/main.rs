//! tactilink CLI - manage the audio clips on a communication aid's SD card.
//!
//! ## Features
//!
//! - List, upload, download and delete clips per bank and key
//! - Sync a local folder into a key directory (sequential or preserved names)
//! - Device status, storage capacity and write-enable flag
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support
//! - Internationalization (i18n) support

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tactilink::{Bank, Key};

mod commands;
mod config;
mod help;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

rust_i18n::i18n!("locales", fallback = "en");

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Default baud rate of the device firmware.
const DEFAULT_BAUD: u32 = 115_200;

/// Default clip extension for folder sync.
const DEFAULT_EXT: &str = "mp3";

/// tactilink - manage audio clips on a communication aid over USB serial.
///
/// Environment variables:
///   TACTILINK_PORT              - Default serial port
///   TACTILINK_BAUD              - Default baud rate (default: 115200)
///   TACTILINK_LANG              - Language/locale (en, zh-CN)
///   TACTILINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "tactilink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Banks: human, generated. Keys: A-Z, SHIFT, YES, NO, WATER, SPACE, PERIOD.")]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "TACTILINK_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate (default: 115200).
    #[arg(short, long, global = true, env = "TACTILINK_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Language/locale for messages (e.g., en, zh-CN).
    #[arg(long, global = true, env = "TACTILINK_LANG")]
    pub(crate) lang: Option<String>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "TACTILINK_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    pub(crate) confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    pub(crate) list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Bank and key addressing one directory on the card.
#[derive(Args, Debug, Clone, Copy)]
pub(crate) struct Target {
    /// Bank: human or generated.
    #[arg(value_parser = parse_bank)]
    pub(crate) bank: Bank,

    /// Key: A-Z, SHIFT, YES, NO, WATER, SPACE or PERIOD.
    #[arg(value_parser = parse_key)]
    pub(crate) key: Key,
}

/// Arguments shared by the folder sync commands.
#[derive(Args, Debug, Clone)]
pub(crate) struct SyncArgs {
    #[command(flatten)]
    pub(crate) target: Target,

    /// Local folder holding the clips.
    pub(crate) folder: PathBuf,

    /// File extension to sync (default: mp3).
    #[arg(long)]
    pub(crate) ext: Option<String>,

    /// Show what would be uploaded without uploading.
    #[arg(long)]
    pub(crate) dry_run: bool,

    /// Stop at the first failed upload.
    #[arg(long)]
    pub(crate) stop_on_error: bool,

    /// Do not send a CRC32 with each upload.
    #[arg(long)]
    pub(crate) no_crc: bool,
}

/// Write-enable state for `flag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum FlagState {
    /// Allow writes and deletes.
    On,
    /// Lock the card against writes.
    Off,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List the files in a key directory.
    Ls {
        #[command(flatten)]
        target: Target,

        /// Output the listing as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Upload a file into a key directory.
    Put {
        #[command(flatten)]
        target: Target,

        /// Local file to upload.
        file: PathBuf,

        /// Name on the card (default: the local file name, as 8.3).
        #[arg(long = "as", value_name = "NAME")]
        remote_name: Option<String>,

        /// Do not send a CRC32 with the upload.
        #[arg(long)]
        no_crc: bool,
    },

    /// Download a file from a key directory.
    Get {
        #[command(flatten)]
        target: Target,

        /// Name of the file on the card.
        name: String,

        /// Output path ("-" for stdout; default: the remote name).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Delete a file from a key directory.
    Del {
        #[command(flatten)]
        target: Target,

        /// Name of the file on the card.
        name: String,

        /// Succeed even if the file does not exist.
        #[arg(short, long)]
        force: bool,
    },

    /// Show device mode and write-enable state.
    Status {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show SD card capacity.
    Stat {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Enable or disable writes on the device.
    Flag {
        /// New state.
        #[arg(value_enum)]
        state: FlagState,
    },

    /// Make the device leave data mode.
    Exit,

    /// Sync a folder as 001.<ext>, 002.<ext>, ...
    SyncSeq {
        #[command(flatten)]
        args: SyncArgs,

        /// Number given to the first file.
        #[arg(long, default_value_t = 1)]
        start: u32,
    },

    /// Sync a folder keeping the local file names (as 8.3).
    SyncPreserve {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn parse_bank(s: &str) -> Result<Bank, String> {
    s.parse().map_err(|e: tactilink::Error| e.to_string())
}

fn parse_key(s: &str) -> Result<Key, String> {
    s.parse().map_err(|e: tactilink::Error| e.to_string())
}

/// CLI-level failures with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or environment (exit 2).
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration (exit 3).
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error chain onto the exit-code contract.
///
/// 1 generic, 2 usage, 3 configuration, 4 device not found or handshake
/// rejected, 130 cancelled.
pub(crate) fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::Usage(_) => 2,
                CliError::Config(_) => 3,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(lib) = cause.downcast_ref::<tactilink::Error>() {
            return match lib {
                tactilink::Error::DeviceNotFound | tactilink::Error::HandshakeTimeout { .. } => 4,
                tactilink::Error::Interrupted => 130,
                tactilink::Error::Config(_) => 3,
                tactilink::Error::InvalidName { .. }
                | tactilink::Error::InvalidBank(_)
                | tactilink::Error::InvalidKey(_) => 2,
                _ => 1,
            };
        }
    }
    1
}

/// Pick up `--lang` before clap runs so help output is localized.
fn early_lang(raw_args: &[String]) -> Option<String> {
    let mut lang = None;
    for (i, arg) in raw_args.iter().enumerate() {
        if let Some(val) = arg.strip_prefix("--lang=") {
            lang = Some(val.to_string());
        } else if arg == "--lang" {
            lang = raw_args.get(i + 1).cloned();
        }
    }
    lang.or_else(|| env::var("TACTILINK_LANG").ok())
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: give up on a clean EXIT.
            std::process::exit(130);
        }
    });
    if let Err(e) = result {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    tactilink::set_interrupt_checker(was_interrupted);
}

fn print_localized_help(raw_args: &[String]) {
    let mut app = help::build_localized_command();
    let found = raw_args.iter().skip(1).find_map(|token| {
        app.get_subcommands()
            .find(|s| s.get_name() == token.as_str())
            .cloned()
    });
    let _ = match found {
        Some(mut sub) => sub.print_help(),
        None => app.print_help(),
    };
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err:#}", style(rust_i18n::t!("common.error")).red().bold());
            exit_code(&err)
        },
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let raw_args: Vec<String> = env::args().collect();

    let locale = early_lang(&raw_args).unwrap_or_else(help::detect_locale);
    rust_i18n::set_locale(&locale);

    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let wants_help = raw_args.iter().any(|a| a == "-h" || a == "--help");
    if wants_help || raw_args.len() <= 1 {
        print_localized_help(&raw_args);
        return Ok(());
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "tactilink v{} (verbose level: {}, locale: {locale})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path).map_err(CliError::Config)?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Ls { target, json } => commands::files::cmd_ls(&cli, &mut config, *target, *json),
        Commands::Put {
            target,
            file,
            remote_name,
            no_crc,
        } => commands::files::cmd_put(
            &cli,
            &mut config,
            *target,
            file,
            remote_name.as_deref(),
            *no_crc,
        ),
        Commands::Get {
            target,
            name,
            output,
        } => commands::files::cmd_get(&cli, &mut config, *target, name, output.as_deref()),
        Commands::Del {
            target,
            name,
            force,
        } => commands::files::cmd_del(&cli, &mut config, *target, name, *force),
        Commands::Status { json } => commands::device::cmd_status(&cli, &mut config, *json),
        Commands::Stat { json } => commands::device::cmd_stat(&cli, &mut config, *json),
        Commands::Flag { state } => {
            commands::device::cmd_flag(&cli, &mut config, *state == FlagState::On)
        },
        Commands::Exit => commands::device::cmd_exit(&cli, &mut config),
        Commands::SyncSeq { args, start } => commands::sync::cmd_sync(
            &cli,
            &mut config,
            args,
            tactilink::NamingPolicy::Sequential { start: *start },
        ),
        Commands::SyncPreserve { args } => {
            commands::sync::cmd_sync(&cli, &mut config, args, tactilink::NamingPolicy::Preserve)
        },
        Commands::ListPorts { json } => {
            commands::device::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(rust_i18n::t!("completions.shell_required").to_string())
                })?;
                commands::completions::cmd_completions(shell)
            }
        },
    }
}

/// Get serial port from CLI args, config or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

/// Baud rate: flag or environment, then config, then the firmware default.
pub(crate) fn resolve_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.port.connection.baud)
        .unwrap_or(DEFAULT_BAUD)
}

/// Sync extension: flag, then config, then mp3.
pub(crate) fn resolve_ext(args: &SyncArgs, config: &Config) -> String {
    args.ext
        .clone()
        .or_else(|| config.sync.ext.clone())
        .unwrap_or_else(|| DEFAULT_EXT.to_string())
}
