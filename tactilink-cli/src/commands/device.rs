//! status, stat, flag, exit and list-ports.

use anyhow::Result;
use console::style;
use indicatif::HumanBytes;
use rust_i18n::t;
use tactilink::{DetectedPort, Space, StatusReport};

use super::with_client;
use crate::Cli;
use crate::config::Config;

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

/// Show device status.
pub(crate) fn cmd_status(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let report = with_client(cli, config, false, |client| Ok(client.status()?))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_status(&report));
    }
    Ok(())
}

fn format_status(report: &StatusReport) -> String {
    let mode = report.mode.as_deref().unwrap_or("-");
    format!("mode={mode} writes={}", on_off(report.writes_enabled))
}

/// Show card capacity.
pub(crate) fn cmd_stat(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let space = with_client(cli, config, false, |client| Ok(client.stat()?))?;

    if json {
        let value = serde_json::json!({
            "total": space.total,
            "free": space.free,
            "used": space.total.saturating_sub(space.free),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", format_space(space));
    }
    Ok(())
}

fn format_space(space: Space) -> String {
    let used = space.total.saturating_sub(space.free);
    t!(
        "stat.line",
        total = HumanBytes(space.total),
        used = HumanBytes(used),
        free = HumanBytes(space.free)
    )
    .to_string()
}

/// Enable or disable writes.
pub(crate) fn cmd_flag(cli: &Cli, config: &mut Config, on: bool) -> Result<()> {
    with_client(cli, config, false, |client| Ok(client.flag(on)?))?;
    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("✓").green().bold(),
            t!("flag.done", state = on_off(on))
        );
    }
    Ok(())
}

/// Enter and leave data mode, leaving the device in its normal mode.
pub(crate) fn cmd_exit(cli: &Cli, config: &mut Config) -> Result<()> {
    with_client(cli, config, false, |_| Ok(()))?;
    if !cli.quiet {
        eprintln!("{} {}", style("✓").green().bold(), t!("exit.done"));
    }
    Ok(())
}

fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List serial ports. JSON goes to stdout, the human listing to stderr.
pub(crate) fn cmd_list_ports(json: bool) {
    let detected = tactilink::detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }

    eprintln!("{}", style(t!("list_ports.header")).bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style(t!("list_ports.no_ports")).dim());
        return;
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{device_type}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan(),
        );
    }

    if let Ok(best) = tactilink::device::select_port(detected) {
        eprintln!(
            "\n{} {}",
            style("→").green().bold(),
            t!(
                "list_ports.auto_detected",
                port = style(&best.name).cyan().bold().to_string()
            )
        );
    }
}
