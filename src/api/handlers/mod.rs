pub mod access;
pub mod admin;
pub mod health;
pub mod mfa;
pub mod progress;

// common functions for the handlers
use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::debug;

use super::AppState;
use crate::identity::Session;
use crate::route::Route;
use crate::{Error, Result};

/// Bearer token from the `Authorization` header, if present and non-empty.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the request's bearer token into a session, if it carries a valid one.
pub(crate) async fn optional_session(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Option<Session>> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    Ok(state.identity().current_session(token).await?)
}

/// Authenticated session, second factor not required.
pub(crate) async fn require_session(headers: &HeaderMap, state: &AppState) -> Result<Session> {
    optional_session(headers, state)
        .await?
        .ok_or(Error::Unauthenticated)
}

/// Authenticated session that has also passed the MFA gate.
pub(crate) async fn require_verified(headers: &HeaderMap, state: &AppState) -> Result<Session> {
    let session = require_session(headers, state).await?;
    let decision = state.mfa().resolve(Some(&session)).await;
    if decision.authorized {
        Ok(session)
    } else {
        debug!(user_id = %session.user_id(), "second factor not verified");
        Err(Error::Unverified(
            decision.redirect.unwrap_or_else(Route::login),
        ))
    }
}
