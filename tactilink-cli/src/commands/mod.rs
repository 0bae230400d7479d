//! Command implementations.
//!
//! Each subcommand group lives in its own module; the helpers here open a
//! data-mode session and build progress bars the same way for all of them.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod files;
pub(crate) mod sync;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::warn;
use rust_i18n::t;
use tactilink::{Client, NativePort};

use crate::config::Config;
use crate::{Cli, CliError, get_port, resolve_baud, use_fancy_output, was_interrupted};

pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled(t!("error.interrupted").to_string()).into())
    } else {
        Ok(())
    }
}

/// Open the port, enter data mode, run `op`, and always leave data mode.
pub(crate) fn with_client<T, F>(cli: &Cli, config: &mut Config, no_crc: bool, op: F) -> Result<T>
where
    F: FnOnce(&mut Client<NativePort>) -> Result<T>,
{
    let mut protocol = config.protocol_config().map_err(CliError::Config)?;
    if no_crc {
        protocol.use_crc = false;
    }

    let port = get_port(cli, config)?;
    let baud = resolve_baud(cli, config);
    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("🔌").cyan(),
            t!("common.using_port", port = port, baud = baud)
        );
    }
    ensure_not_interrupted()?;

    let mut client = Client::open(&port, baud, protocol)
        .with_context(|| t!("error.connect", port = port.clone()).to_string())?;
    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("✓").green(),
            t!("common.connected", version = client.session().version())
        );
    }

    let result = op(&mut client);

    let retries = client.retries();
    if retries > 0 {
        warn!("{}", t!("common.resynced", count = retries));
    }
    client.close();

    result.and_then(|value| {
        ensure_not_interrupted()?;
        Ok(value)
    })
}

/// Byte progress bar on stderr; hidden when quiet or not a terminal.
pub(crate) fn transfer_bar(cli: &Cli, message: String) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    ) {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb
}

/// Item progress bar for folder sync.
pub(crate) fn items_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Progress callback adapter for `(done, total)` library callbacks.
pub(crate) fn track(pb: &ProgressBar) -> impl FnMut(usize, usize) + '_ {
    move |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    }
}
