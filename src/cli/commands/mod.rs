pub mod admin;
pub mod cors;
pub mod identity;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_VERBOSITY: &str = "verbosity";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// `COMPLIRA_LOG_LEVEL` takes a level name or its index in [`LOG_LEVELS`];
/// `-v` flags count up the same scale.
fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim().to_lowercase();
    let index = match level.parse::<usize>() {
        Ok(index) if index < LOG_LEVELS.len() => Some(index),
        Ok(_) => None,
        Err(_) => LOG_LEVELS.iter().position(|name| *name == level),
    };
    index
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("unknown log level {level:?}, expected one of {LOG_LEVELS:?}"))
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("complira")
        .about("Compliance training access control and progression")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("COMPLIRA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("COMPLIRA_DSN")
                .hide_env_values(true)
                .required(true),
        );

    let command = identity::with_args(command);
    let command = cors::with_args(command);
    admin::with_args(command).arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log output one step per flag, from error up to trace")
            .env("COMPLIRA_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(parse_log_level),
    )
}
