//! Shell completion generation and installation.
//!
//! `completions <shell>` prints a script; `completions --install` writes it
//! where the shell looks for completions and prints activation hints.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use rust_i18n::t;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::{Cli, CliError};

const BIN: &str = "tactilink";

/// Completion script for `shell`.
fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, BIN, &mut buf);
    buf
}

/// Print completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) -> Result<()> {
    write_script(shell, &mut io::stdout().lock())
}

fn write_script(shell: Shell, out: &mut impl Write) -> Result<()> {
    out.write_all(&render(shell))
        .and_then(|()| out.flush())
        .with_context(|| format!("Failed to write {shell} completions"))
}

/// Detect the user's shell from `$SHELL`, or PowerShell on Windows.
pub(crate) fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path).file_name()?.to_str()? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

/// `$XDG_<var>` or `~/<fallback>`.
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    env::var(var).map_or_else(
        |_| {
            fallback
                .iter()
                .fold(home_dir().unwrap_or_default(), |dir, part| dir.join(part))
        },
        PathBuf::from,
    )
}

fn install_path(shell: Shell) -> Result<PathBuf> {
    let config = || xdg_dir("XDG_CONFIG_HOME", &[".config"]);
    let path = match shell {
        Shell::Bash => xdg_dir("XDG_DATA_HOME", &[".local", "share"])
            .join("bash-completion/completions")
            .join(BIN),
        Shell::Zsh => home_dir()?.join(".zfunc").join(format!("_{BIN}")),
        Shell::Fish => config().join("fish/completions").join(format!("{BIN}.fish")),
        Shell::Elvish => config().join("elvish/lib").join(format!("{BIN}.elv")),
        Shell::PowerShell => {
            let dir = match env::var("PROFILE") {
                Ok(profile) => PathBuf::from(profile)
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
                Err(_) => config().join("powershell/completions"),
            };
            dir.join(format!("{BIN}.ps1"))
        },
        _ => return Err(CliError::Usage(t!("completions.unsupported").to_string()).into()),
    };
    Ok(path)
}

/// Make sure `~/.zshrc` puts `~/.zfunc` on `fpath`.
fn ensure_zsh_fpath() -> Result<()> {
    let zshrc = home_dir()?.join(".zshrc");
    let fpath_line = "fpath=(~/.zfunc $fpath)";
    let present = fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(fpath_line));
    if present {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# {BIN} completions")?;
    writeln!(file, "{fpath_line}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;
    eprintln!(
        "{} {}",
        style("✓").green().bold(),
        t!("completions.zshrc_updated", path = zshrc.display().to_string())
    );
    Ok(())
}

/// Install completions for `shell_arg` (or the detected shell).
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = shell_arg
        .or_else(detect_shell_type)
        .ok_or_else(|| CliError::Usage(t!("completions.detect_failed").to_string()))?;

    let path = install_path(shell)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, render(shell))
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} {}",
        style("✓").green().bold(),
        t!(
            "completions.installed",
            shell = style(format!("{shell:?}")).cyan().to_string(),
            path = style(path.display()).yellow().to_string()
        )
    );

    eprintln!();
    match shell {
        Shell::Bash => eprintln!(
            "{}",
            t!(
                "completions.hint_bash",
                cmd = style(format!("source {}", path.display())).cyan().to_string()
            )
        ),
        Shell::Zsh => {
            ensure_zsh_fpath()?;
            eprintln!(
                "{}",
                t!("completions.hint_zsh", cmd = style("exec zsh").cyan().to_string())
            );
        },
        Shell::PowerShell => eprintln!(
            "{}",
            t!(
                "completions.hint_powershell",
                cmd = style(format!("Import-Module {}", path.display())).cyan().to_string()
            )
        ),
        _ => eprintln!("{}", t!("completions.hint_auto")),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("/usr/bin/elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/usr/bin/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("powershell"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("zsh"), Some(Shell::Zsh));
    }

    #[test]
    fn test_shell_from_path_unknown() {
        assert_eq!(shell_from_path("/usr/bin/tcsh"), None);
        assert_eq!(shell_from_path("/bin/ksh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_install_paths_end_with_binary_name() {
        let expected = [
            (Shell::Bash, "tactilink"),
            (Shell::Zsh, "_tactilink"),
            (Shell::Fish, "tactilink.fish"),
            (Shell::Elvish, "tactilink.elv"),
            (Shell::PowerShell, "tactilink.ps1"),
        ];
        for (shell, file) in expected {
            let path = install_path(shell).unwrap();
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some(file),
                "{shell:?}"
            );
        }
    }

    #[test]
    fn test_install_path_bash_uses_bash_completion_dir() {
        let path = install_path(Shell::Bash).unwrap();
        assert!(path.to_string_lossy().contains("bash-completion"));
    }

    #[test]
    fn test_render_mentions_binary_and_subcommands() {
        let bash = String::from_utf8(render(Shell::Bash)).unwrap();
        assert!(bash.contains("_tactilink()"));
        assert!(bash.contains("sync-seq"));

        for shell in [Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            assert!(!render(shell).is_empty(), "{shell:?}");
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_script_reports_write_errors() {
        let err = write_script(Shell::Bash, &mut ClosedPipe).unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_write_script_writes_whole_script() {
        let mut out = Vec::new();
        write_script(Shell::Fish, &mut out).unwrap();
        assert_eq!(out, render(Shell::Fish));
    }

    #[test]
    fn test_detect_shell_type_does_not_panic() {
        let _ = detect_shell_type();
    }
}
