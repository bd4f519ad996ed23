//! Entitlement handlers
//!
//! Every route is scoped to the caller: the credential subject must match the
//! `user_id` in the path.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use slate_types::{ShotAllowance, UserEntitlement};
use tracing::instrument;

use super::shared::{record_op_duration, validate_identifier, ShotRequest, UsageRequest};
use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /api/v1/entitlement/{user_id}
#[instrument(skip(state, user))]
pub async fn get_entitlement(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserEntitlement>> {
    validate_identifier(&user_id, "userId")?;
    user.ensure_owner(&user_id)?;
    Ok(Json(state.resolver.get_entitlement(&user_id).await?))
}

/// POST /api/v1/entitlement/{user_id}/usage
///
/// Hot path: one conditional update per call.
#[instrument(skip(state, user, req), fields(pages = req.pages))]
pub async fn record_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
    Json(req): Json<UsageRequest>,
) -> ApiResult<Json<UserEntitlement>> {
    let start = Instant::now();
    validate_identifier(&user_id, "userId")?;
    user.ensure_owner(&user_id)?;
    let pages = req.validate()?;

    let result = state.resolver.record_usage(&user_id, pages).await;
    record_op_duration("record_usage", start, result.is_ok());

    Ok(Json(result?))
}

/// POST /api/v1/entitlement/{user_id}/shots
#[instrument(skip(state, user, req))]
pub async fn enforce_shots(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
    Json(req): Json<ShotRequest>,
) -> ApiResult<Json<ShotAllowance>> {
    validate_identifier(&user_id, "userId")?;
    user.ensure_owner(&user_id)?;
    let requested = req.validate()?;
    Ok(Json(state.resolver.enforce_shot_limit(&user_id, requested).await))
}
