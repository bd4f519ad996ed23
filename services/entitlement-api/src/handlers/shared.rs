//! Request records and boundary validation
//!
//! Every external event is parsed into one of these records and validated
//! before it reaches the engine.

use std::time::Instant;

use serde::Deserialize;
use slate_core::{ConfirmRequest, RedeemRequest};

use crate::error::ApiError;

// ============================================================================
// Input Validation
// ============================================================================

/// Maximum length for identifiers and codes
const MAX_ID_LEN: usize = 128;

/// Maximum length for email addresses
const MAX_EMAIL_LEN: usize = 254;

/// Largest page count accepted in one usage report
const MAX_PAGES_PER_REQUEST: i32 = 10_000;

/// Largest shot count accepted for clamping
const MAX_REQUESTED_SHOTS: u32 = 1_000;

/// Validate an identifier (user id, transaction id, promo code)
pub fn validate_identifier(value: &str, field: &str) -> Result<(), ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field} too long (max {MAX_ID_LEN} chars)"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(ApiError::BadRequest(format!("{field} contains invalid characters")));
    }
    Ok(())
}

/// Validate an email address shape
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::BadRequest("email is invalid".into()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::BadRequest("email is invalid".into())),
    }
}

// ============================================================================
// Request Records
// ============================================================================

/// Gateway callback body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
    pub transaction_id: String,
    pub user_id: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl PaymentCallback {
    pub fn validate(self) -> Result<ConfirmRequest, ApiError> {
        validate_identifier(&self.transaction_id, "transactionId")?;
        validate_identifier(&self.user_id, "userId")?;
        if self.amount < 0 {
            return Err(ApiError::BadRequest("amount must not be negative".into()));
        }
        let currency = self.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ApiError::BadRequest("currency must be an ISO 4217 code".into()));
        }
        if self.status.trim().is_empty() {
            return Err(ApiError::BadRequest("status is required".into()));
        }

        Ok(ConfirmRequest {
            transaction_id: self.transaction_id.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
            amount: self.amount,
            currency,
            raw_status: self.status,
            metadata: self.metadata.unwrap_or_else(|| serde_json::json!({})),
        })
    }
}

/// Promo code submission body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoSubmission {
    pub code: String,
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub source_ip: Option<String>,
}

impl PromoSubmission {
    /// `fallback_ip` is the peer address, used when the body names none
    pub fn validate(self, fallback_ip: Option<String>) -> Result<RedeemRequest, ApiError> {
        validate_identifier(&self.code, "code")?;
        validate_identifier(&self.user_id, "userId")?;
        validate_email(&self.email)?;

        Ok(RedeemRequest {
            code: self.code,
            user_id: self.user_id.trim().to_string(),
            email: self.email.trim().to_string(),
            source_ip: self.source_ip.filter(|ip| !ip.trim().is_empty()).or(fallback_ip),
        })
    }
}

/// Page usage report body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRequest {
    pub pages: i32,
}

impl UsageRequest {
    pub fn validate(&self) -> Result<i32, ApiError> {
        if self.pages <= 0 {
            return Err(ApiError::BadRequest("pages must be a positive integer".into()));
        }
        if self.pages > MAX_PAGES_PER_REQUEST {
            return Err(ApiError::BadRequest(format!(
                "pages too large (max {MAX_PAGES_PER_REQUEST})"
            )));
        }
        Ok(self.pages)
    }
}

/// Shot clamp request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRequest {
    pub requested_shots: u32,
}

impl ShotRequest {
    pub fn validate(&self) -> Result<u32, ApiError> {
        if self.requested_shots > MAX_REQUESTED_SHOTS {
            return Err(ApiError::BadRequest(format!(
                "requestedShots too large (max {MAX_REQUESTED_SHOTS})"
            )));
        }
        Ok(self.requested_shots)
    }
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record handler duration with result label
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "entitlement_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================
