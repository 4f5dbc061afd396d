//! JSON error responses.
//!
//! Status mapping:
//! - 400 validation or invariant violation
//! - 401 missing or rejected token
//! - 403 missing privilege or unverified second factor
//! - 404 not found
//! - 500 dependency failure or partially applied operation; details stay in the logs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::Error;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    /// Where the client should send the user next, when that is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl Error {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unverified(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::InvariantViolation(_) => StatusCode::BAD_REQUEST,
            Self::Dependency(_) | Self::PartiallyApplied(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, redirect) = match &self {
            Self::Dependency(detail) => {
                error!("request failed: {detail}");
                ("internal error".to_string(), None)
            }
            Self::PartiallyApplied(detail) => {
                error!("operation partially applied: {detail}");
                (
                    "operation partially applied, manual reconciliation required".to_string(),
                    None,
                )
            }
            Self::Unverified(route) => (self.to_string(), Some(route.path())),
            other => (other.to_string(), None),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
            redirect,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;

    #[test]
    fn status_codes() {
        assert_eq!(Error::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Unverified(Route::MfaSelect).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::InvariantViolation(String::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::PartiallyApplied(String::new()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn dependency_details_are_hidden() -> anyhow::Result<()> {
        let response = Error::Dependency("password=hunter2".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["error"], "dependency_error");
        assert_eq!(body["message"], "internal error");
        Ok(())
    }

    #[tokio::test]
    async fn unverified_carries_redirect() -> anyhow::Result<()> {
        let response = Error::Unverified(Route::mfa_verify_email()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["redirect"], "/mfa-verify?method=email");
        Ok(())
    }
}
