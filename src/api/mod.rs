//! HTTP API.
//!
//! Flow Overview:
//! 1) Every request gets an `x-request-id` (ULID unless the caller sent one),
//!    propagated to the response and recorded on the request span.
//! 2) Handlers resolve the bearer token through the identity provider and run
//!    the same gates the web client uses.
//! 3) Domain errors become JSON bodies with stable codes, see [`error`].

pub mod cors;
pub mod error;
pub mod handlers;
pub mod openapi;
mod state;

pub use self::cors::CorsConfig;
pub use self::openapi::openapi;
pub use self::state::AppState;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post, put},
    Extension, Router,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

/// Open the Postgres pool.
/// # Errors
/// Return error if the database cannot be reached
pub async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Build the router with every endpoint, the docs UI and the request layers.
#[must_use]
pub fn app(state: Arc<AppState>, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(|| async { env!("CARGO_PKG_NAME") }))
        .route("/v1/access/check", post(handlers::access::check_access))
        .route("/v1/mfa/status", get(handlers::mfa::status))
        .route("/v1/me/mfa", put(handlers::mfa::set_preference))
        .route("/v1/mfa/email", post(handlers::mfa::email))
        .route("/v1/progress", get(handlers::progress::progress))
        .route(
            "/v1/training/complete",
            post(handlers::progress::complete_training),
        )
        .route("/v1/quizzes/:sequence", get(handlers::progress::quiz))
        .route(
            "/v1/quizzes/:sequence/attempts",
            post(handlers::progress::submit_attempt),
        )
        .route(
            "/v1/admin/org-admins/:user_id/deactivate",
            post(handlers::admin::deactivate_org_admin),
        )
        .route("/v1/admin/seats", get(handlers::admin::seats))
        .route(
            "/v1/admin/test-accounts/purge",
            post(handlers::admin::purge_test_accounts),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors.layer())
                .layer(Extension(state)),
        )
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
}

/// Serve `app` until ctrl-c.
/// # Errors
/// Return error if the port cannot be bound or the server fails
pub async fn serve(port: u16, app: Router) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
