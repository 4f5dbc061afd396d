//! Identity gateway: sessions, assurance levels, second factors and privileged
//! identity administration.
//!
//! Flow Overview:
//! 1) A bearer token is resolved into a [`Session`] by the identity provider.
//! 2) Gates ask the provider for the session's assurance level and factors.
//! 3) Administration operations ban, list and delete identities through
//!    [`IdentityAdmin`], which requires the provider's service credentials.
//!
//! Security boundaries: the provider is the only authority on who a token
//! belongs to; nothing in this crate trusts a client-asserted user id.

pub mod context;
pub mod events;
pub mod gotrue;
pub mod memory;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use context::SessionContext;
pub use events::{AuthEvent, AuthEvents, Subscription};

/// Lockout applied when an account is deactivated (100 years).
pub const BAN_DURATION: Duration = Duration::from_secs(876_000 * 60 * 60);

/// An authenticated identity session.
#[derive(Clone)]
pub struct Session {
    user_id: Uuid,
    email: Option<String>,
    access_token: SecretString,
}

impl Session {
    #[must_use]
    pub fn new(user_id: Uuid, email: Option<String>, access_token: SecretString) -> Self {
        Self {
            user_id,
            email,
            access_token,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"***")
            .finish()
    }
}

/// Authenticator assurance level of a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssuranceLevel {
    /// First factor only.
    Aal1,
    /// Second factor verified during this session.
    Aal2,
}

impl AssuranceLevel {
    /// Parse the `aal` claim; anything unrecognised is treated as `aal1`.
    #[must_use]
    pub fn from_claim(value: &str) -> Self {
        match value.trim() {
            "aal2" => Self::Aal2,
            _ => Self::Aal1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FactorKind {
    Totp,
    Phone,
    Other,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FactorStatus {
    Verified,
    Unverified,
}

/// An enrolled second-factor credential.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Factor {
    pub id: String,
    pub kind: FactorKind,
    pub status: FactorStatus,
}

impl Factor {
    #[must_use]
    pub fn totp(id: impl Into<String>, status: FactorStatus) -> Self {
        Self {
            id: id.into(),
            kind: FactorKind::Totp,
            status,
        }
    }

    #[must_use]
    pub fn is_verified_totp(&self) -> bool {
        self.kind == FactorKind::Totp && self.status == FactorStatus::Verified
    }
}

/// Identity record as seen by administration calls.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("malformed identity response: {0}")]
    Malformed(String),
    #[error("identity user {0} not found")]
    UserNotFound(Uuid),
    #[error("identity admin credentials are not configured")]
    AdminNotConfigured,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Session-side surface of the identity provider.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Resolve an access token into a live session, or `None` if it is not valid.
    async fn current_session(&self, access_token: &str) -> Result<Option<Session>, IdentityError>;

    async fn assurance_level(&self, session: &Session) -> Result<AssuranceLevel, IdentityError>;

    async fn list_factors(&self, session: &Session) -> Result<Vec<Factor>, IdentityError>;

    async fn sign_in(&self, email: &str, password: &SecretString)
        -> Result<Session, IdentityError>;

    async fn sign_out(&self, session: &Session) -> Result<(), IdentityError>;
}

/// Privileged identity administration (service credentials).
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn ban_user(&self, user_id: Uuid, duration: Duration) -> Result<(), IdentityError>;

    async fn list_users(&self) -> Result<Vec<IdentityUser>, IdentityError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assurance_level_from_claim() {
        assert_eq!(AssuranceLevel::from_claim("aal2"), AssuranceLevel::Aal2);
        assert_eq!(AssuranceLevel::from_claim("aal1"), AssuranceLevel::Aal1);
        assert_eq!(AssuranceLevel::from_claim("aal3"), AssuranceLevel::Aal1);
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session::new(Uuid::nil(), None, SecretString::from("secret-token"));
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn ban_duration_is_876000_hours() {
        assert_eq!(BAN_DURATION.as_secs() / 3600, 876_000);
    }
}
