//! CORS origin policy.
//!
//! Allowed: the configured origins, plus `localhost` and `127.0.0.1` on any
//! port for local development. Every other origin is rejected unless
//! `allow_any` is set, in which case the layer answers `*`.

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use url::Url;

#[derive(Clone, Debug, Default)]
pub struct CorsConfig {
    allowed_origins: Vec<String>,
    allow_any: bool,
}

impl CorsConfig {
    #[must_use]
    pub fn new<I, S>(allowed_origins: I, allow_any: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_origins = allowed_origins
            .into_iter()
            .map(|origin| normalize_origin(origin.as_ref()))
            .filter(|origin| !origin.is_empty())
            .collect();
        Self {
            allowed_origins,
            allow_any,
        }
    }

    #[must_use]
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    #[must_use]
    pub fn allow_any(&self) -> bool {
        self.allow_any
    }

    #[must_use]
    pub fn layer(&self) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static("x-request-id"),
            ])
            .allow_methods([Method::GET, Method::POST, Method::PUT]);

        if self.allow_any {
            return cors.allow_origin(Any);
        }

        let allowed: Arc<[String]> = self.allowed_origins.clone().into();
        cors.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| origin_allowed(origin, &allowed))
            },
        ))
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_lowercase()
}

/// Whether `origin` may call the API without the allow-any escape hatch.
#[must_use]
pub fn origin_allowed(origin: &str, allowed_origins: &[String]) -> bool {
    let origin = normalize_origin(origin);
    if allowed_origins.iter().any(|allowed| *allowed == origin) {
        return true;
    }
    Url::parse(&origin).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https")
            && matches!(url.host_str(), Some("localhost" | "127.0.0.1"))
    })
}
