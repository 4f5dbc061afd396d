//! Frontend routes the gates redirect to.

use serde::{Serialize, Serializer};
use std::fmt;
use url::form_urlencoded;

/// A redirect target understood by the web client.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/login`, optionally carrying the path to return to after sign-in.
    Login { return_to: Option<String> },
    /// `/mfa-select`
    MfaSelect,
    /// `/mfa-enroll`
    MfaEnroll,
    /// `/mfa-verify`, or `/mfa-verify?method=email` for email codes.
    MfaVerify { email: bool },
    /// `/platform`
    Platform,
    /// `/admin`
    Admin,
    /// `/dashboard`
    Dashboard,
}

impl Route {
    #[must_use]
    pub const fn login() -> Self {
        Self::Login { return_to: None }
    }

    /// Login route that sends the user back to `path` after sign-in.
    ///
    /// Only same-origin absolute paths are kept; anything else (full URLs,
    /// protocol-relative `//host` paths, and `/\host`, which browsers read as
    /// `//host`) is dropped so the login page cannot be turned into an open
    /// redirect.
    #[must_use]
    pub fn login_returning(path: &str) -> Self {
        let path = path.trim();
        let return_to = (path.starts_with('/')
            && !path.starts_with("//")
            && !path.starts_with("/\\")
            && path != "/login")
            .then(|| path.to_string());
        Self::Login { return_to }
    }

    #[must_use]
    pub const fn mfa_verify_totp() -> Self {
        Self::MfaVerify { email: false }
    }

    #[must_use]
    pub const fn mfa_verify_email() -> Self {
        Self::MfaVerify { email: true }
    }

    /// Render the route as a path (with query string when needed).
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Login { return_to: None } => "/login".to_string(),
            Self::Login {
                return_to: Some(path),
            } => {
                let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
                format!("/login?redirect={encoded}")
            }
            Self::MfaSelect => "/mfa-select".to_string(),
            Self::MfaEnroll => "/mfa-enroll".to_string(),
            Self::MfaVerify { email: false } => "/mfa-verify".to_string(),
            Self::MfaVerify { email: true } => "/mfa-verify?method=email".to_string(),
            Self::Platform => "/platform".to_string(),
            Self::Admin => "/admin".to_string(),
            Self::Dashboard => "/dashboard".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::Route;

    #[test]
    fn paths_render() {
        assert_eq!(Route::login().path(), "/login");
        assert_eq!(Route::MfaSelect.path(), "/mfa-select");
        assert_eq!(Route::MfaEnroll.path(), "/mfa-enroll");
        assert_eq!(Route::mfa_verify_totp().path(), "/mfa-verify");
        assert_eq!(Route::mfa_verify_email().path(), "/mfa-verify?method=email");
        assert_eq!(Route::Platform.path(), "/platform");
        assert_eq!(Route::Admin.path(), "/admin");
        assert_eq!(Route::Dashboard.path(), "/dashboard");
    }

    #[test]
    fn login_returning_encodes_path() {
        let route = Route::login_returning("/quiz/2?retry=true");
        assert_eq!(route.path(), "/login?redirect=%2Fquiz%2F2%3Fretry%3Dtrue");
    }

    #[test]
    fn login_returning_drops_foreign_targets() {
        assert_eq!(Route::login_returning("https://evil.test/"), Route::login());
        assert_eq!(Route::login_returning("//evil.test/x"), Route::login());
        assert_eq!(Route::login_returning("/\\evil.test"), Route::login());
        assert_eq!(Route::login_returning("/\\/evil.test"), Route::login());
        assert_eq!(Route::login_returning("/login"), Route::login());
    }

    #[test]
    fn serializes_as_path() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&Route::mfa_verify_email())?;
        assert_eq!(json, "\"/mfa-verify?method=email\"");
        Ok(())
    }
}
