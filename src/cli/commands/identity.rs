use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_IDENTITY_URL: &str = "identity-url";
pub const ARG_IDENTITY_ANON_KEY: &str = "identity-anon-key";
pub const ARG_IDENTITY_SERVICE_KEY: &str = "identity-service-key";
pub const ARG_EMAIL_MFA_URL: &str = "email-mfa-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub anon_key: SecretString,
    pub service_key: Option<SecretString>,
    pub email_mfa_url: Option<Url>,
}

impl Options {
    /// Parse identity provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or a URL is invalid.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // clap passes empty env vars through; treat them as unset
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(url) = get_non_empty(ARG_IDENTITY_URL) else {
            anyhow::bail!("missing required argument: --{ARG_IDENTITY_URL}");
        };
        Url::parse(&url).map_err(|err| anyhow::anyhow!("invalid --{ARG_IDENTITY_URL}: {err}"))?;

        let Some(anon_key) = get_non_empty(ARG_IDENTITY_ANON_KEY) else {
            anyhow::bail!("missing required argument: --{ARG_IDENTITY_ANON_KEY}");
        };

        let email_mfa_url = get_non_empty(ARG_EMAIL_MFA_URL)
            .map(|value| Url::parse(&value))
            .transpose()
            .map_err(|err| anyhow::anyhow!("invalid --{ARG_EMAIL_MFA_URL}: {err}"))?;

        Ok(Self {
            url,
            anon_key: SecretString::from(anon_key),
            service_key: get_non_empty(ARG_IDENTITY_SERVICE_KEY).map(SecretString::from),
            email_mfa_url,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Identity provider base URL, example: https://project.supabase.co")
                .env("COMPLIRA_IDENTITY_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_ANON_KEY)
                .long(ARG_IDENTITY_ANON_KEY)
                .help("Identity provider public (anon) API key")
                .env("COMPLIRA_IDENTITY_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_SERVICE_KEY)
                .long(ARG_IDENTITY_SERVICE_KEY)
                .help("Identity provider service key, required for ban, list and delete")
                .env("COMPLIRA_IDENTITY_SERVICE_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_MFA_URL)
                .long(ARG_EMAIL_MFA_URL)
                .help("Remote email-MFA endpoint; the built-in code service is used when unset")
                .env("COMPLIRA_EMAIL_MFA_URL"),
        )
}
