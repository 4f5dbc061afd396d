//! Error taxonomy shared by the gates, the administration operations and the API.

use thiserror::Error;

use crate::{identity::IdentityError, mfa::email::EmailMfaError, route::Route, store::StoreError};

#[derive(Debug, Error)]
pub enum Error {
    /// No session, or the session token was rejected.
    #[error("authentication required")]
    Unauthenticated,
    /// Authenticated, but the second factor is incomplete.
    #[error("multi-factor verification required")]
    Unverified(Route),
    /// Authenticated and verified, but the caller lacks the required role.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Malformed input to an API or administration call.
    #[error("{0}")]
    Validation(String),
    /// A downstream store, identity or email call failed.
    #[error("dependency failure: {0}")]
    Dependency(String),
    /// The request targets an entity in a state the operation does not allow.
    #[error("{0}")]
    InvariantViolation(String),
    /// A multi-step operation failed and its compensating write failed too.
    #[error("{0}")]
    PartiallyApplied(String),
}

impl Error {
    /// Stable machine-readable code used in JSON error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Unverified(_) => "unverified",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Dependency(_) => "dependency_error",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::PartiallyApplied(_) => "partially_applied",
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Dependency(err.to_string())
    }
}

impl From<IdentityError> for Error {
    fn from(err: IdentityError) -> Self {
        Self::Dependency(err.to_string())
    }
}

impl From<EmailMfaError> for Error {
    fn from(err: EmailMfaError) -> Self {
        match err {
            EmailMfaError::MissingEmail => {
                Self::Validation("no email address on file for this account".to_string())
            }
            other => Self::Dependency(other.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_dependency_errors() {
        let err: Error = StoreError::Unavailable("profiles".to_string()).into();
        assert_eq!(err.code(), "dependency_error");
    }

    #[test]
    fn missing_email_is_a_validation_error() {
        let err: Error = EmailMfaError::MissingEmail.into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
