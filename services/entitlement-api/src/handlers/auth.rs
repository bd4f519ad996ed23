//! Login handler

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use slate_core::{IssuedToken, LoginRequest};
use slate_types::{PromoOutcome, UserEntitlement};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    /// Firebase ID token
    pub id_token: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub entitlement: UserEntitlement,
    pub token: IssuedToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo: Option<PromoOutcome>,
}

/// POST /api/v1/auth/login
///
/// Exchange an ID token for an entitlement credential.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<LoginResponse>> {
    if body.id_token.trim().is_empty() {
        return Err(ApiError::BadRequest("idToken is required".into()));
    }

    let result = state
        .account
        .login(LoginRequest {
            id_token: body.id_token,
            coupon_code: body.coupon_code,
            ip_address: Some(addr.ip().to_string()),
        })
        .await?;

    Ok(Json(LoginResponse {
        entitlement: result.entitlement,
        token: result.token,
        promo: result.promo,
    }))
}
