use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_CORS_ALLOWED_ORIGINS: &str = "cors-allowed-origins";
pub const ARG_CORS_ALLOW_ANY: &str = "cors-allow-any";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub allowed_origins: Vec<String>,
    pub allow_any: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let allowed_origins = matches
            .get_many::<String>(ARG_CORS_ALLOWED_ORIGINS)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            allowed_origins,
            allow_any: matches.get_flag(ARG_CORS_ALLOW_ANY),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CORS_ALLOWED_ORIGINS)
                .long(ARG_CORS_ALLOWED_ORIGINS)
                .help("Comma separated origins allowed to call the API (localhost is always allowed)")
                .env("COMPLIRA_CORS_ALLOWED_ORIGINS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_CORS_ALLOW_ANY)
                .long(ARG_CORS_ALLOW_ANY)
                .help("Answer any origin with `*`")
                .env("COMPLIRA_CORS_ALLOW_ANY")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_from_env() {
        temp_env::with_vars(
            [
                (
                    "COMPLIRA_CORS_ALLOWED_ORIGINS",
                    Some("https://app.complira.dev, https://admin.complira.dev,"),
                ),
                ("COMPLIRA_CORS_ALLOW_ANY", None),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(["test"]);
                let options = Options::parse(&matches);
                assert_eq!(
                    options.allowed_origins,
                    vec![
                        "https://app.complira.dev".to_string(),
                        "https://admin.complira.dev".to_string()
                    ]
                );
                assert!(!options.allow_any);
            },
        );
    }

    #[test]
    fn allow_any_flag() {
        temp_env::with_vars([("COMPLIRA_CORS_ALLOW_ANY", None::<&str>)], || {
            let matches =
                with_args(Command::new("test")).get_matches_from(["test", "--cors-allow-any"]);
            assert!(Options::parse(&matches).allow_any);
        });
    }
}
