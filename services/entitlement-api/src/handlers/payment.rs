//! Payment gateway callback handler

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use slate_core::payment::SIGNATURE_HEADER;
use slate_core::IssuedToken;
use slate_types::{ConfirmOutcome, UserEntitlement};

use super::shared::{record_op_duration, PaymentCallback};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub outcome: ConfirmOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlement: Option<UserEntitlement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<IssuedToken>,
}

/// POST /api/v1/payment/confirm
///
/// The signature covers the raw body, so it is checked before parsing.
pub async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ConfirmResponse>> {
    let start = Instant::now();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or_else(|| {
            tracing::warn!("Payment callback without signature header");
            ApiError::Unauthorized("Missing gateway signature")
        })?
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid signature header encoding".into()))?;
    state.signatures.verify(&body, signature)?;

    let callback: PaymentCallback = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed payment callback: {e}")))?;
    let request = callback.validate()?;

    let result = state.payment.confirm(request).await;
    record_op_duration("confirm_payment", start, result.is_ok());
    let result = result?;

    Ok(Json(ConfirmResponse {
        outcome: result.outcome,
        entitlement: result.entitlement,
        token: result.token,
    }))
}
