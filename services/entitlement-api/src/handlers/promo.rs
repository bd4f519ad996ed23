//! Promo code handler

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::Serialize;
use slate_core::IssuedToken;
use slate_types::{PromoOutcome, Tier, UserEntitlement};

use super::shared::{record_op_duration, PromoSubmission};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub tier: Tier,
    pub entitlement: Option<UserEntitlement>,
    pub token: Option<IssuedToken>,
}

/// POST /api/v1/promo/redeem
pub async fn redeem_promo(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<PromoSubmission>,
) -> ApiResult<Json<RedeemResponse>> {
    let start = Instant::now();
    let request = body.validate(Some(addr.ip().to_string()))?;

    let result = state.promo.redeem(request).await;
    record_op_duration("redeem_promo", start, result.is_ok());
    let result = result?;

    match result.outcome {
        PromoOutcome::Applied { tier } => Ok(Json(RedeemResponse {
            tier,
            entitlement: result.entitlement,
            token: result.token,
        })),
        PromoOutcome::Rejected { reason } => Err(ApiError::Promo(reason)),
    }
}
