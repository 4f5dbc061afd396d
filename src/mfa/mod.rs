//! MFA assurance resolver.
//!
//! Decides whether an authenticated session is fully trusted and, if not, which
//! step of the second-factor flow the user is sent to.
//!
//! Flow Overview:
//! 1) A session at `aal2` is authorized regardless of the stored profile method.
//! 2) Email-MFA users are authorized only by a verified email-MFA session.
//! 3) Everyone else is routed by their enrolled factors and profile settings.
//!
//! The resolver is read-only and fails closed: an error never authorizes.

pub mod email;
pub mod email_codes;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::identity::{AssuranceLevel, IdentityGateway, Session};
use crate::route::Route;
use crate::store::{MfaMethod, Store};

use self::email::EmailMfaCheck;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MfaDecision {
    pub authorized: bool,
    pub redirect: Option<Route>,
}

impl MfaDecision {
    #[must_use]
    pub const fn authorized() -> Self {
        Self {
            authorized: true,
            redirect: None,
        }
    }

    #[must_use]
    pub const fn redirect(route: Route) -> Self {
        Self {
            authorized: false,
            redirect: Some(route),
        }
    }
}

#[derive(Clone)]
pub struct MfaResolver {
    identity: Arc<dyn IdentityGateway>,
    store: Arc<dyn Store>,
    email_check: Arc<dyn EmailMfaCheck>,
}

impl MfaResolver {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityGateway>,
        store: Arc<dyn Store>,
        email_check: Arc<dyn EmailMfaCheck>,
    ) -> Self {
        Self {
            identity,
            store,
            email_check,
        }
    }

    /// Resolve the session's MFA state. Never fails.
    pub async fn resolve(&self, session: Option<&Session>) -> MfaDecision {
        let Some(session) = session else {
            return MfaDecision::redirect(Route::login());
        };
        match self.evaluate(session).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(user_id = %session.user_id(), "MFA resolution failed: {err}");
                MfaDecision::redirect(Route::login())
            }
        }
    }

    async fn evaluate(&self, session: &Session) -> crate::Result<MfaDecision> {
        if self.identity.assurance_level(session).await? == AssuranceLevel::Aal2 {
            return Ok(MfaDecision::authorized());
        }

        let (method, enabled) = self
            .store
            .profile(session.user_id())
            .await?
            .map_or((MfaMethod::None, false), |profile| {
                (profile.mfa_method, profile.mfa_enabled)
            });

        if method == MfaMethod::Email {
            return Ok(match self.email_check.session_verified(session).await {
                Ok(true) => MfaDecision::authorized(),
                Ok(false) => MfaDecision::redirect(Route::mfa_verify_email()),
                Err(err) => {
                    warn!(user_id = %session.user_id(), "email MFA check failed: {err}");
                    MfaDecision::redirect(Route::mfa_verify_email())
                }
            });
        }

        let factors = self.identity.list_factors(session).await?;
        let route = if factors.iter().any(|factor| factor.is_verified_totp()) {
            Route::mfa_verify_totp()
        } else if method == MfaMethod::None || !enabled {
            Route::MfaSelect
        } else {
            Route::MfaEnroll
        };
        debug!(user_id = %session.user_id(), route = %route, "second factor required");
        Ok(MfaDecision::redirect(route))
    }
}
