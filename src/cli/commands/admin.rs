use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use regex::Regex;

pub const ARG_PURGE_ALLOW_LIST: &str = "purge-allow-list";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub purge_allow_list: Vec<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let purge_allow_list = matches
            .get_many::<String>(ARG_PURGE_ALLOW_LIST)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { purge_allow_list }
    }
}

/// Accept only values shaped like an email address. Empty entries pass and are
/// dropped by [`Options::parse`].
#[must_use]
pub fn validator_email() -> ValueParser {
    ValueParser::from(move |email: &str| -> std::result::Result<String, String> {
        let email = email.trim();
        if email.is_empty()
            || Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
        {
            Ok(email.to_string())
        } else {
            Err(format!("invalid email: {email}"))
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_PURGE_ALLOW_LIST)
            .long(ARG_PURGE_ALLOW_LIST)
            .help("Comma separated test-account emails the bulk purge may delete")
            .env("COMPLIRA_PURGE_ALLOW_LIST")
            .value_delimiter(',')
            .value_parser(validator_email()),
    )
}
