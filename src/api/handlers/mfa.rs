//! Second-factor endpoints.
//!
//! These run before the second factor is complete, so they only require an
//! authenticated session:
//! - `GET /v1/mfa/status` reports where the MFA gate would send the user.
//! - `PUT /v1/me/mfa` records the method picked on the selection screen.
//! - `POST /v1/mfa/email` sends and verifies email codes.

use axum::{
    extract::{Extension, Json},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::require_session;
use crate::api::AppState;
use crate::mfa::email_codes::VerifyOutcome;
use crate::store::MfaMethod;
use crate::{Error, Result};

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaStatusResponse {
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    pub method: MfaMethod,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MfaPreferenceRequest {
    pub method: MfaMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaPreferenceResponse {
    pub method: MfaMethod,
    pub enabled: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EmailMfaAction {
    SendCode,
    VerifyCode,
    CheckSession,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EmailMfaRequest {
    pub action: EmailMfaAction,
    /// Required for `verify-code`.
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum EmailMfaResponse {
    Sent { sent: bool },
    Verify(VerifyOutcome),
    Session { verified: bool },
}

#[utoipa::path(
    get,
    path = "/v1/mfa/status",
    responses(
        (status = 200, description = "MFA gate decision for the session.", body = MfaStatusResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = crate::api::error::ErrorBody),
    ),
    tag = "mfa"
)]
pub async fn status(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MfaStatusResponse>> {
    let session = require_session(&headers, &state).await?;
    let decision = state.mfa().resolve(Some(&session)).await;
    let (method, enabled) = state
        .store()
        .profile(session.user_id())
        .await?
        .map_or((MfaMethod::None, false), |profile| {
            (profile.mfa_method, profile.mfa_enabled)
        });

    Ok(Json(MfaStatusResponse {
        authorized: decision.authorized,
        redirect: decision.redirect.map(|route| route.path()),
        method,
        enabled,
    }))
}

#[utoipa::path(
    put,
    path = "/v1/me/mfa",
    request_body = MfaPreferenceRequest,
    responses(
        (status = 200, description = "Method recorded.", body = MfaPreferenceResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = crate::api::error::ErrorBody),
        (status = 404, description = "No profile for the user.", body = crate::api::error::ErrorBody),
    ),
    tag = "mfa"
)]
pub async fn set_preference(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<MfaPreferenceRequest>,
) -> Result<Json<MfaPreferenceResponse>> {
    let session = require_session(&headers, &state).await?;
    let enabled = request.method != MfaMethod::None;

    let updated = state
        .store()
        .set_mfa_preference(session.user_id(), request.method, enabled)
        .await?;
    if !updated {
        return Err(Error::NotFound("profile not found".to_string()));
    }

    info!(
        user_id = %session.user_id(),
        method = request.method.as_str(),
        "MFA method selected"
    );
    Ok(Json(MfaPreferenceResponse {
        method: request.method,
        enabled,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/mfa/email",
    request_body = EmailMfaRequest,
    responses(
        (status = 200, description = "Result of the requested action.", body = EmailMfaResponse),
        (status = 400, description = "Missing code or no email on file.", body = crate::api::error::ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = crate::api::error::ErrorBody),
    ),
    tag = "mfa"
)]
pub async fn email(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EmailMfaRequest>,
) -> Result<Json<EmailMfaResponse>> {
    let session = require_session(&headers, &state).await?;
    let codes = state.email_codes();

    let response = match request.action {
        EmailMfaAction::SendCode => {
            codes.send_code(&session).await?;
            EmailMfaResponse::Sent { sent: true }
        }
        EmailMfaAction::VerifyCode => {
            let code = request
                .code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .ok_or_else(|| Error::Validation("code is required".to_string()))?;
            EmailMfaResponse::Verify(codes.verify_code(&session, code).await?)
        }
        EmailMfaAction::CheckSession => EmailMfaResponse::Session {
            verified: codes.check_session(&session).await?,
        },
    };
    Ok(Json(response))
}
