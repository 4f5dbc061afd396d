//! Self-hosted email MFA codes.
//!
//! Flow Overview:
//! 1) `send-code`: a 6-digit code is generated, its SHA-256 hash is stored with
//!    an expiry, and the code is emailed to the profile address.
//! 2) `verify-code`: the submitted code is hashed and compared. A limited number
//!    of wrong attempts is allowed per challenge.
//! 3) A correct code consumes the challenge and opens a verified email-MFA
//!    session that `check-session` reports until it lapses.
//!
//! Security boundaries: plaintext codes are never stored or logged here.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::email::{EmailMfaCheck, EmailMfaError};
use crate::email::{EmailMessage, EmailSender, MFA_CODE_TEMPLATE};
use crate::identity::Session;
use crate::store::{AttemptClaim, EmailMfaChallenge, Store};

const CODE_DIGITS: usize = 6;

#[derive(Clone, Copy, Debug)]
pub struct EmailCodeConfig {
    code_ttl: Duration,
    max_attempts: i32,
    session_ttl: Duration,
}

impl EmailCodeConfig {
    /// Default config: codes live 10 minutes, 5 attempts per code, and a
    /// verified session lasts 12 hours.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_ttl: Duration::minutes(10),
            max_attempts: 5,
            session_ttl: Duration::hours(12),
        }
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }
}

impl Default for EmailCodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Verified,
    Invalid { remaining_attempts: i32 },
    Expired,
    TooManyAttempts,
    NoChallenge,
}

pub struct EmailCodeService {
    store: Arc<dyn Store>,
    sender: Arc<dyn EmailSender>,
    config: EmailCodeConfig,
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:0width$}", width = CODE_DIGITS)
}

fn hash_code(user_id: Uuid, code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(code.trim().as_bytes());
    hasher.finalize().to_vec()
}

impl EmailCodeService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn EmailSender>, config: EmailCodeConfig) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    /// Issue a new code, replacing any outstanding one.
    ///
    /// # Errors
    /// Returns `MissingEmail` if no address is on file, or a store/delivery error.
    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    pub async fn send_code(&self, session: &Session) -> Result<(), EmailMfaError> {
        let user_id = session.user_id();
        let profile_email = self
            .store
            .profile(user_id)
            .await?
            .and_then(|profile| profile.email);
        let to_email = profile_email
            .or_else(|| session.email().map(str::to_string))
            .filter(|email| !email.trim().is_empty())
            .ok_or(EmailMfaError::MissingEmail)?;

        let code = generate_code();
        let challenge = EmailMfaChallenge {
            user_id,
            code_hash: hash_code(user_id, &code),
            expires_at: Utc::now() + self.config.code_ttl,
            attempts: 0,
        };
        self.store.put_challenge(&challenge).await?;

        let message = EmailMessage {
            to_email,
            template: MFA_CODE_TEMPLATE.to_string(),
            payload: json!({
                "code": code,
                "expires_in_minutes": self.config.code_ttl.num_minutes(),
            }),
        };
        if let Err(err) = self.sender.send(&message) {
            self.store.clear_challenge(user_id).await?;
            return Err(EmailMfaError::Delivery(err.to_string()));
        }
        info!("email MFA code sent");
        Ok(())
    }

    /// # Errors
    /// Returns an error only if the store fails.
    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    pub async fn verify_code(
        &self,
        session: &Session,
        code: &str,
    ) -> Result<VerifyOutcome, EmailMfaError> {
        let user_id = session.user_id();
        // The attempt is counted before the code is compared, so concurrent
        // guesses cannot share one slot.
        let claim = self
            .store
            .claim_attempt(user_id, self.config.max_attempts, Utc::now())
            .await?;
        let (code_hash, attempts) = match claim {
            AttemptClaim::Claimed {
                code_hash,
                attempts,
            } => (code_hash, attempts),
            AttemptClaim::Missing => return Ok(VerifyOutcome::NoChallenge),
            AttemptClaim::Expired => {
                self.store.clear_challenge(user_id).await?;
                debug!("email MFA code expired");
                return Ok(VerifyOutcome::Expired);
            }
            AttemptClaim::Exhausted => {
                self.store.clear_challenge(user_id).await?;
                return Ok(VerifyOutcome::TooManyAttempts);
            }
        };

        if hash_code(user_id, code) == code_hash {
            self.store.clear_challenge(user_id).await?;
            self.store
                .mark_verified(user_id, Utc::now() + self.config.session_ttl)
                .await?;
            info!("email MFA verified");
            return Ok(VerifyOutcome::Verified);
        }

        if attempts >= self.config.max_attempts {
            self.store.clear_challenge(user_id).await?;
            warn!("email MFA attempts exhausted");
            return Ok(VerifyOutcome::TooManyAttempts);
        }
        Ok(VerifyOutcome::Invalid {
            remaining_attempts: self.config.max_attempts - attempts,
        })
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn check_session(&self, session: &Session) -> Result<bool, EmailMfaError> {
        let until = self.store.verified_until(session.user_id()).await?;
        Ok(until.is_some_and(|until| until > Utc::now()))
    }
}

#[async_trait]
impl EmailMfaCheck for EmailCodeService {
    async fn session_verified(&self, session: &Session) -> Result<bool, EmailMfaError> {
        self.check_session(session).await
    }
}
