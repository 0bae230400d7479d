//! Localized help output.
//!
//! clap stays the source of truth for the argument structure; headings,
//! command descriptions and argument help are swapped for catalog entries
//! (`help.*`, `cmd.<name>.about`, `arg.<id>.help`) when they exist.

use clap::CommandFactory;
use rust_i18n::t;

use crate::Cli;

/// Supported locales for i18n.
pub(crate) const SUPPORTED_LOCALES: &[&str] = &["en", "zh-CN"];

/// Detect the best matching locale from system settings.
pub(crate) fn detect_locale() -> String {
    let system_locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    match_locale(&system_locale)
}

/// Map a system locale string onto a supported catalog.
///
/// `zh_CN.UTF-8`, `zh-CN` and `zh` map to `zh-CN`; everything else
/// (including `C` and `POSIX`) falls back to `en`.
pub(crate) fn match_locale(raw: &str) -> String {
    let locale = raw.split('.').next().unwrap_or(raw).replace('_', "-");

    if SUPPORTED_LOCALES.contains(&locale.as_str()) {
        return locale;
    }

    let lang_code = locale.split('-').next().unwrap_or(&locale);
    match lang_code.to_lowercase().as_str() {
        "zh" => "zh-CN".to_string(),
        _ => "en".to_string(),
    }
}

/// Look up `key`, returning `None` when the catalog has no entry.
fn lookup(key: &str) -> Option<String> {
    let localized = t!(key).to_string();
    (localized != key).then_some(localized)
}

/// Build a clap `Command` with localized help output.
pub(crate) fn build_localized_command() -> clap::Command {
    // Headings must be 'static for clap; the process prints help once and exits.
    let args_heading: &'static str =
        Box::leak(t!("help.arguments_heading").to_string().into_boxed_str());
    let opts_heading: &'static str =
        Box::leak(t!("help.options_heading").to_string().into_boxed_str());

    let heading = move |arg: clap::Arg| {
        let arg = localize_arg(arg);
        if arg.get_short().is_none() && arg.get_long().is_none() {
            arg.help_heading(args_heading)
        } else {
            arg.help_heading(opts_heading)
        }
    };

    let tpl = format!(
        "{{bin}} {{version}}\n\n{{about}}\n\n\
         {usage_h}:\n  {{usage}}\n\n\
         {cmds_h}:\n{{subcommands}}\n\n\
         {opts_h}:\n{{options}}\n\n\
         {{after-help}}\n",
        usage_h = t!("help.usage_heading"),
        cmds_h = t!("help.commands_heading"),
        opts_h = t!("help.options_heading"),
    );

    let sub_tpl = format!(
        "{{bin}} {{version}}\n\n{{about}}\n\n\
         {usage_h}:\n  {{usage}}\n\n\
         {{all-args}}\n",
        usage_h = t!("help.usage_heading"),
    );

    Cli::command()
        .help_template(&tpl)
        .about(t!("app.about").to_string())
        .after_help(t!("app.after_help").to_string())
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            clap::Arg::new("help")
                .short('h')
                .long("help")
                .help(t!("arg.help_flag.help").to_string())
                .help_heading(opts_heading)
                .action(clap::ArgAction::Help)
                .global(true),
        )
        .arg(
            clap::Arg::new("version")
                .short('V')
                .long("version")
                .help(t!("arg.version_flag.help").to_string())
                .help_heading(opts_heading)
                .action(clap::ArgAction::Version)
                .global(true),
        )
        .mut_args(heading)
        .mut_subcommands(move |sub| {
            let about_key = format!("cmd.{}.about", sub.get_name().replace('-', "_"));
            let sub = match lookup(&about_key) {
                Some(about) => sub.about(about),
                None => sub,
            };
            sub.help_template(sub_tpl.clone()).mut_args(heading)
        })
        .disable_help_subcommand(true)
        .subcommand(clap::Command::new("help").about(t!("cmd.help.about").to_string()))
}

/// Replace an arg's help text with `arg.<id>.help` when the catalog has it.
pub(crate) fn localize_arg(arg: clap::Arg) -> clap::Arg {
    let key = format!("arg.{}.help", arg.get_id().as_str());
    match lookup(&key) {
        Some(help) => arg.help(help),
        None => arg,
    }
}
