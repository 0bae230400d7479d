//! ls, put, get and del.

use anyhow::{Context, Result};
use console::style;
use indicatif::HumanBytes;
use rust_i18n::t;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use super::{track, transfer_bar, with_client};
use crate::config::Config;
use crate::{Cli, CliError, Target};

/// List a key directory. Entries go to stdout, one `name size` per line.
pub(crate) fn cmd_ls(cli: &Cli, config: &mut Config, target: Target, json: bool) -> Result<()> {
    let Target { bank, key } = target;
    let listing = with_client(cli, config, false, |client| Ok(client.list(bank, key)?))?;

    if json {
        let value = serde_json::json!({
            "bank": bank,
            "key": key,
            "exists": listing.is_some(),
            "entries": listing.as_deref().unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match listing {
        None => {
            if !cli.quiet {
                eprintln!(
                    "{} {}",
                    style("ℹ").blue(),
                    t!("ls.no_dir", bank = bank, key = key)
                );
            }
        },
        Some(entries) => {
            if entries.is_empty() && !cli.quiet {
                eprintln!("{} {}", style("ℹ").blue(), t!("ls.empty", bank = bank, key = key));
            }
            for entry in &entries {
                println!("{} {}", entry.name, entry.size);
            }
            if !cli.quiet && !entries.is_empty() {
                let total: u64 = entries.iter().map(|e| e.size).sum();
                eprintln!(
                    "{}",
                    style(t!("ls.summary", count = entries.len(), size = HumanBytes(total)))
                        .dim()
                );
            }
        },
    }
    Ok(())
}

/// Default remote name: the local file name.
fn default_remote_name(file: &Path) -> Result<String> {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Usage(t!("put.no_file_name").to_string()).into())
}

/// Upload one file.
pub(crate) fn cmd_put(
    cli: &Cli,
    config: &mut Config,
    target: Target,
    file: &Path,
    remote_name: Option<&str>,
    no_crc: bool,
) -> Result<()> {
    let Target { bank, key } = target;
    let data = fs::read(file)
        .with_context(|| t!("error.read_file", path = file.display().to_string()).to_string())?;
    let name = match remote_name {
        Some(name) => name.to_string(),
        None => default_remote_name(file)?,
    };
    // Reject names that cannot be 8.3 before touching the port.
    let remote = tactilink::FileName::parse(&name)?;

    let pb = transfer_bar(cli, t!("put.uploading", name = remote.as_str()).to_string());
    let summary = with_client(cli, config, no_crc, |client| {
        Ok(client.put_with_progress(bank, key, remote.as_str(), &data, track(&pb))?)
    });
    pb.finish_and_clear();
    let summary = summary?;

    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("✓").green().bold(),
            t!(
                "put.done",
                name = summary.name.as_str(),
                bank = bank,
                key = key,
                size = HumanBytes(summary.size)
            )
        );
        if let Some(crc) = summary.crc {
            eprintln!(
                "    {} {}",
                style("•").dim(),
                t!(
                    "put.detail",
                    crc = format!("0x{crc:08X}"),
                    window = summary.window,
                    acks = summary.acks
                )
            );
        }
    }
    Ok(())
}

/// Download one file to `output` (`-` for stdout).
pub(crate) fn cmd_get(
    cli: &Cli,
    config: &mut Config,
    target: Target,
    name: &str,
    output: Option<&Path>,
) -> Result<()> {
    let Target { bank, key } = target;
    let remote = tactilink::FileName::parse(name)?;

    let pb = transfer_bar(cli, t!("get.downloading", name = remote.as_str()).to_string());
    let data = with_client(cli, config, false, |client| {
        Ok(client.get_with_progress(bank, key, remote.as_str(), track(&pb))?)
    });
    pb.finish_and_clear();
    let data = data?;

    let to_stdout = output.is_some_and(|p| p == Path::new("-"));
    if to_stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&data)?;
        stdout.flush()?;
        return Ok(());
    }

    let path = output.map_or_else(|| PathBuf::from(remote.as_str()), Path::to_path_buf);
    fs::write(&path, &data)
        .with_context(|| t!("error.write_file", path = path.display().to_string()).to_string())?;
    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("✓").green().bold(),
            t!(
                "get.done",
                name = remote.as_str(),
                path = path.display().to_string(),
                size = HumanBytes(data.len() as u64)
            )
        );
    }
    Ok(())
}

/// Delete one file. A missing file is an error unless `force`.
pub(crate) fn cmd_del(
    cli: &Cli,
    config: &mut Config,
    target: Target,
    name: &str,
    force: bool,
) -> Result<()> {
    let Target { bank, key } = target;
    let remote = tactilink::FileName::parse(name)?;

    let deleted = with_client(cli, config, false, |client| {
        Ok(client.delete(bank, key, remote.as_str())?)
    })?;

    if deleted {
        if !cli.quiet {
            eprintln!(
                "{} {}",
                style("✓").green().bold(),
                t!("del.done", name = remote.as_str(), bank = bank, key = key)
            );
        }
        Ok(())
    } else if force {
        if !cli.quiet {
            eprintln!(
                "{} {}",
                style("ℹ").blue(),
                t!("del.not_found", name = remote.as_str(), bank = bank, key = key)
            );
        }
        Ok(())
    } else {
        anyhow::bail!(t!("del.not_found", name = remote.as_str(), bank = bank, key = key).to_string())
    }
}
