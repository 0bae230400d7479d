//! sync-seq and sync-preserve.

use anyhow::Result;
use console::style;
use indicatif::HumanBytes;
use log::info;
use rust_i18n::t;
use tactilink::{ItemOutcome, NamingPolicy, SyncOptions, SyncReport};

use super::{items_bar, with_client};
use crate::config::Config;
use crate::{Cli, CliError, SyncArgs, resolve_ext};

/// Sync a local folder into one key directory.
pub(crate) fn cmd_sync(
    cli: &Cli,
    config: &mut Config,
    args: &SyncArgs,
    policy: NamingPolicy,
) -> Result<()> {
    let (bank, key) = (args.target.bank, args.target.key);
    if !args.folder.is_dir() {
        return Err(CliError::Usage(
            t!("sync.not_a_folder", path = args.folder.display().to_string()).to_string(),
        )
        .into());
    }

    let ext = resolve_ext(args, config);
    let options = SyncOptions {
        dry_run: args.dry_run,
        stop_on_error: args.stop_on_error || config.sync.stop_on_error,
    };
    info!(
        "Syncing {} (*.{ext}) into {bank}/{key} ({policy:?})",
        args.folder.display()
    );

    let pb = items_bar(cli);
    let report = with_client(cli, config, args.no_crc, |client| {
        Ok(client.sync_folder(
            bank,
            key,
            &args.folder,
            &ext,
            policy,
            options,
            |index, total, upload| {
                pb.set_length(total as u64);
                pb.set_position(index as u64);
                pb.set_message(format!("{} -> {}", upload.local.name, upload.remote));
            },
        )?)
    });
    pb.finish_and_clear();
    let report = report?;

    if !cli.quiet {
        print_report(&report, args.dry_run);
    }

    if report.interrupted {
        return Err(CliError::Cancelled(t!("error.interrupted").to_string()).into());
    }
    if report.failed() > 0 || !report.rejected.is_empty() {
        anyhow::bail!(
            t!(
                "sync.incomplete",
                failed = report.failed(),
                rejected = report.rejected.len()
            )
            .to_string()
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport, dry_run: bool) {
    for item in &report.items {
        let upload = &item.upload;
        let line = format!(
            "{} -> {} ({})",
            upload.local.name,
            upload.remote,
            HumanBytes(upload.local.size)
        );
        match &item.outcome {
            ItemOutcome::Uploaded => eprintln!("  {} {line}", style("✓").green()),
            ItemOutcome::Planned => eprintln!("  {} {line}", style("+").cyan()),
            ItemOutcome::Failed(e) => {
                eprintln!("  {} {line}: {}", style("✗").red(), style(e).red());
            },
        }
    }
    for rejected in &report.rejected {
        eprintln!(
            "  {} {}: {}",
            style("!").yellow(),
            rejected.local.name,
            rejected.reason
        );
    }

    let summary_key = if dry_run {
        "sync.summary_dry_run"
    } else {
        "sync.summary"
    };
    eprintln!(
        "{} {}",
        style("ℹ").blue(),
        t!(
            summary_key,
            uploaded = report.uploaded(),
            planned = report.planned(),
            up_to_date = report.up_to_date.len(),
            failed = report.failed(),
            rejected = report.rejected.len()
        )
    );
}
