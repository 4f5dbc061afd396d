//! Privileged administration endpoints.
//!
//! Each handler requires a verified session and hands it to [`crate::admin`],
//! which reads the caller's role itself.

use axum::{
    extract::{Extension, Json, Path, Query},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::require_verified;
use crate::admin::{DeactivationReport, PurgeReport, SeatCapacity};
use crate::api::AppState;
use crate::Result;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SeatsQuery {
    /// Organization to check; defaults to the caller's own.
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PurgeRequest {
    /// Classify only; nothing is deleted.
    pub dry_run: bool,
}

#[utoipa::path(
    post,
    path = "/v1/admin/org-admins/{user_id}/deactivate",
    params(("user_id" = Uuid, Path, description = "Org admin to deactivate")),
    responses(
        (status = 200, description = "Profile inactive and identity locked out.", body = DeactivationReport),
        (status = 400, description = "Target is not an org admin.", body = crate::api::error::ErrorBody),
        (status = 403, description = "Caller is not a platform owner.", body = crate::api::error::ErrorBody),
        (status = 404, description = "Target has no role or profile.", body = crate::api::error::ErrorBody),
        (status = 500, description = "Lockout failed; body tells whether the profile was restored.", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn deactivate_org_admin(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DeactivationReport>> {
    let session = require_verified(&headers, &state).await?;
    let report = state.admin().deactivate_org_admin(&session, user_id).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/v1/admin/seats",
    params(SeatsQuery),
    responses(
        (status = 200, description = "Current seat usage.", body = SeatCapacity),
        (status = 400, description = "Caller has no organization.", body = crate::api::error::ErrorBody),
        (status = 403, description = "Caller may not check this organization.", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn seats(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SeatsQuery>,
) -> Result<Json<SeatCapacity>> {
    let session = require_verified(&headers, &state).await?;
    let seats = state
        .admin()
        .seat_capacity(&session, query.organization_id)
        .await?;
    Ok(Json(seats))
}

#[utoipa::path(
    post,
    path = "/v1/admin/test-accounts/purge",
    request_body = PurgeRequest,
    responses(
        (status = 200, description = "Itemized purge report.", body = PurgeReport),
        (status = 403, description = "Caller is not a platform owner.", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn purge_test_accounts(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PurgeRequest>,
) -> Result<Json<PurgeReport>> {
    let session = require_verified(&headers, &state).await?;
    let report = state
        .admin()
        .purge_test_accounts(&session, request.dry_run)
        .await?;
    Ok(Json(report))
}
