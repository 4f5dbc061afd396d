use crate::admin::{is_protected, AdminConfig};
use crate::api::{self, AppState, CorsConfig};
use crate::email::LogEmailSender;
use crate::identity::gotrue::GoTrueClient;
use crate::mfa::email::{EmailMfaCheck, HttpEmailMfaCheck};
use crate::mfa::email_codes::EmailCodeConfig;
use crate::store::{postgres::PgStore, Store};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub identity_url: String,
    pub identity_anon_key: SecretString,
    pub identity_service_key: Option<SecretString>,
    pub email_mfa_url: Option<Url>,
    pub cors_allowed_origins: Vec<String>,
    pub cors_allow_any: bool,
    pub purge_allow_list: Vec<String>,
}

/// DSN with any password replaced, safe to log.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("***")).is_err() {
                return "***".to_string();
            }
            url.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or identity client cannot be set up, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        port = args.port,
        dsn = %redact_dsn(args.dsn.expose_secret()),
        identity_url = %args.identity_url,
        email_mfa = args.email_mfa_url.as_ref().map_or("built-in", Url::as_str),
        cors_allowed_origins = ?args.cors_allowed_origins,
        cors_allow_any = args.cors_allow_any,
        purge_allow_list = args.purge_allow_list.len(),
        "starting complira"
    );

    if args.identity_service_key.is_none() {
        warn!("no identity service key configured; admin operations will fail");
    }
    if args
        .purge_allow_list
        .iter()
        .any(|email| is_protected(Some(email.as_str())))
    {
        warn!("purge allow-list names the protected account; it will still never be deleted");
    }

    let pool = api::connect(args.dsn.expose_secret()).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let identity = Arc::new(
        GoTrueClient::new(
            &args.identity_url,
            args.identity_anon_key,
            args.identity_service_key,
        )
        .context("Failed to build identity provider client")?,
    );

    let email_check = match args.email_mfa_url {
        Some(url) => {
            let check: Arc<dyn EmailMfaCheck> = Arc::new(
                HttpEmailMfaCheck::new(url).context("Failed to build email MFA client")?,
            );
            Some(check)
        }
        None => None,
    };

    let state = AppState::new(
        identity.clone(),
        identity,
        store,
        Arc::new(LogEmailSender),
        email_check,
        EmailCodeConfig::new(),
        AdminConfig::new().with_purge_allow_list(&args.purge_allow_list),
    );
    let cors = CorsConfig::new(&args.cors_allowed_origins, args.cors_allow_any);

    api::serve(args.port, api::app(Arc::new(state), &cors)).await
}
