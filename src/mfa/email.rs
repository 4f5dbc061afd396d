//! Email-MFA session check.
//!
//! The resolver only needs to know whether the user holds a currently valid,
//! verified email-MFA session. That answer comes either from the in-process
//! [`crate::mfa::email_codes::EmailCodeService`] or from a remote endpoint via
//! [`HttpEmailMfaCheck`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::identity::Session;
use crate::store::StoreError;

const CHECK_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Error)]
pub enum EmailMfaError {
    #[error("account has no email address")]
    MissingEmail,
    #[error("email MFA request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("email MFA endpoint returned {0}")]
    Status(u16),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait EmailMfaCheck: Send + Sync {
    /// Whether `session`'s user has a currently valid verified email-MFA session.
    async fn session_verified(&self, session: &Session) -> Result<bool, EmailMfaError>;
}

#[derive(Debug, Deserialize)]
struct CheckReply {
    #[serde(default)]
    verified: bool,
}

/// Calls a remote email-MFA endpoint with the caller's bearer token.
#[derive(Debug, Clone)]
pub struct HttpEmailMfaCheck {
    url: Url,
    client: Client,
}

impl HttpEmailMfaCheck {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(CHECK_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl EmailMfaCheck for HttpEmailMfaCheck {
    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    async fn session_verified(&self, session: &Session) -> Result<bool, EmailMfaError> {
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(session.access_token())
            .json(&json!({ "action": "check-session" }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EmailMfaError::Status(response.status().as_u16()));
        }
        let reply: CheckReply = response.json().await?;
        Ok(reply.verified)
    }
}
