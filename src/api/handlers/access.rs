//! Combined route check for the web client.
//!
//! The client asks before mounting a protected route. A missing or rejected
//! token is not an error here: it is answered with the login redirect, the same
//! as the guard gives any signed-out visitor. An unreachable identity provider
//! also ends in `/login`.

use axum::{
    extract::{Extension, Json},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use super::optional_session;
use crate::api::AppState;
use crate::authz::{Role, RoleSet};
use crate::guard::AccessState;
use crate::route::Route;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AccessCheckRequest {
    /// Path the client wants to render, e.g. `/quiz/2`.
    pub path: String,
    pub allowed_roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCheckResponse {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl From<AccessState> for AccessCheckResponse {
    fn from(state: AccessState) -> Self {
        match state {
            AccessState::Granted => Self {
                granted: true,
                redirect: None,
            },
            AccessState::Redirect(route) => Self {
                granted: false,
                redirect: Some(route.path()),
            },
            // Never produced by a one-shot check; still never grants.
            AccessState::Checking => Self {
                granted: false,
                redirect: None,
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/access/check",
    request_body = AccessCheckRequest,
    responses(
        (status = 200, description = "Guard decision for the requested route.", body = AccessCheckResponse),
    ),
    tag = "access"
)]
pub async fn check_access(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AccessCheckRequest>,
) -> Json<AccessCheckResponse> {
    let session = match optional_session(&headers, &state).await {
        Ok(session) => session,
        Err(err) => {
            warn!(path = %request.path, "session lookup failed: {err}");
            return Json(AccessState::Redirect(Route::login()).into());
        }
    };
    let allowed: RoleSet = request.allowed_roles.into_iter().collect();
    let access = state
        .guard()
        .check(session.as_ref(), allowed, &request.path)
        .await;
    Json(access.into())
}
