//! Account deletion handlers

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionResponse {
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    /// When the account will be removed
    pub deletion_due_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/account/deletion
pub async fn request_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DeletionResponse>> {
    let entitlement = state.account.request_deletion(user.user_id()).await?;
    let grace = state.config.engine.grace_period();

    tracing::info!(user_id = user.user_id(), "Deletion requested");
    Ok(Json(DeletionResponse {
        deletion_scheduled_at: entitlement.deletion_scheduled_at,
        deletion_due_at: entitlement.deletion_scheduled_at.map(|at| at + grace),
    }))
}

/// DELETE /api/v1/account/deletion
pub async fn cancel_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DeletionResponse>> {
    state.account.cancel_deletion(user.user_id()).await?;

    tracing::info!(user_id = user.user_id(), "Deletion cancelled");
    Ok(Json(DeletionResponse {
        deletion_scheduled_at: None,
        deletion_due_at: None,
    }))
}
