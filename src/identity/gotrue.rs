//! HTTP client for a GoTrue-compatible identity provider.
//!
//! Flow Overview:
//! - `GET /auth/v1/user` validates a bearer token and returns the user with its
//!   enrolled factors.
//! - The assurance level is read from the token's `aal` claim, only after the
//!   provider has accepted the token.
//! - Admin calls (`/auth/v1/admin/users`) authenticate with the service key.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::{
    AssuranceLevel, Factor, FactorKind, FactorStatus, IdentityAdmin, IdentityError,
    IdentityGateway, IdentityUser, Session,
};

const REQUEST_TIMEOUT_SECONDS: u64 = 10;
const ADMIN_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    factors: Vec<FactorPayload>,
}

#[derive(Debug, Deserialize)]
struct FactorPayload {
    id: String,
    factor_type: String,
    status: String,
}

impl From<FactorPayload> for Factor {
    fn from(payload: FactorPayload) -> Self {
        let kind = match payload.factor_type.as_str() {
            "totp" => FactorKind::Totp,
            "phone" => FactorKind::Phone,
            _ => FactorKind::Other,
        };
        let status = if payload.status == "verified" {
            FactorStatus::Verified
        } else {
            FactorStatus::Unverified
        };
        Self {
            id: payload.id,
            kind,
            status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    aal: Option<String>,
}

#[derive(Debug)]
pub struct GoTrueClient {
    base_url: Url,
    anon_key: SecretString,
    service_key: Option<SecretString>,
    client: Client,
}

impl GoTrueClient {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        service_key: Option<SecretString>,
    ) -> anyhow::Result<Self> {
        // A trailing slash keeps `Url::join` from dropping the last path segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            base_url,
            anon_key,
            service_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|err| IdentityError::Malformed(format!("invalid endpoint {path}: {err}")))
    }

    fn service_key(&self) -> Result<&str, IdentityError> {
        self.service_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or(IdentityError::AdminNotConfigured)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<UserPayload>, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(provider_error(response).await),
        }
    }
}

async fn provider_error(response: Response) -> IdentityError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    IdentityError::Provider { status, message }
}

/// Read the `aal` claim from a JWT without verifying it.
///
/// Callers must only use this on tokens the provider has already accepted.
pub(crate) fn assurance_from_token(token: &str) -> Result<AssuranceLevel, IdentityError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError::Malformed("access token is not a JWT".to_string()))?;
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('='))
        .map_err(|_| IdentityError::Malformed("invalid JWT payload encoding".to_string()))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|err| IdentityError::Malformed(format!("invalid JWT claims: {err}")))?;
    Ok(claims
        .aal
        .as_deref()
        .map_or(AssuranceLevel::Aal1, AssuranceLevel::from_claim))
}

fn ban_duration_value(duration: Duration) -> String {
    format!("{}h", duration.as_secs() / 3600)
}

#[async_trait]
impl IdentityGateway for GoTrueClient {
    #[instrument(skip_all)]
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>, IdentityError> {
        let Some(user) = self.fetch_user(access_token).await? else {
            debug!("identity provider rejected access token");
            return Ok(None);
        };
        Ok(Some(Session::new(
            user.id,
            user.email,
            SecretString::from(access_token.to_string()),
        )))
    }

    async fn assurance_level(&self, session: &Session) -> Result<AssuranceLevel, IdentityError> {
        assurance_from_token(session.access_token())
    }

    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    async fn list_factors(&self, session: &Session) -> Result<Vec<Factor>, IdentityError> {
        let user = self
            .fetch_user(session.access_token())
            .await?
            .ok_or_else(|| IdentityError::Malformed("session no longer valid".to_string()))?;
        Ok(user.factors.into_iter().map(Factor::from).collect())
    }

    #[instrument(skip_all)]
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .client
            .post(url)
            .header("apikey", self.anon_key.expose_secret())
            .json(&json!({ "email": email, "password": password.expose_secret() }))
            .send()
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                Err(IdentityError::InvalidCredentials)
            }
            status if status.is_success() => {
                let payload: TokenPayload = response.json().await?;
                Ok(Session::new(
                    payload.user.id,
                    payload.user.email,
                    SecretString::from(payload.access_token),
                ))
            }
            _ => Err(provider_error(response).await),
        }
    }

    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token())
            .send()
            .await?;
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(provider_error(response).await)
        }
    }
}

#[async_trait]
impl IdentityAdmin for GoTrueClient {
    #[instrument(skip(self))]
    async fn ban_user(&self, user_id: Uuid, duration: Duration) -> Result<(), IdentityError> {
        let key = self.service_key()?;
        let response = self
            .client
            .put(self.endpoint(&format!("auth/v1/admin/users/{user_id}"))?)
            .header("apikey", key)
            .bearer_auth(key)
            .json(&json!({ "ban_duration": ban_duration_value(duration) }))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::UserNotFound(user_id)),
            status if status.is_success() => Ok(()),
            _ => Err(provider_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn list_users(&self) -> Result<Vec<IdentityUser>, IdentityError> {
        let key = self.service_key()?;
        let mut users = Vec::new();
        let mut page = 1_usize;
        loop {
            let mut url = self.endpoint("auth/v1/admin/users")?;
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &ADMIN_PAGE_SIZE.to_string());
            let response = self
                .client
                .get(url)
                .header("apikey", key)
                .bearer_auth(key)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(provider_error(response).await);
            }
            let batch: UsersPage = response.json().await?;
            let fetched = batch.users.len();
            users.extend(batch.users.into_iter().map(|user| IdentityUser {
                id: user.id,
                email: user.email,
            }));
            if fetched < ADMIN_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError> {
        let key = self.service_key()?;
        let response = self
            .client
            .delete(self.endpoint(&format!("auth/v1/admin/users/{user_id}"))?)
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::UserNotFound(user_id)),
            status if status.is_success() => Ok(()),
            _ => Err(provider_error(response).await),
        }
    }
}
