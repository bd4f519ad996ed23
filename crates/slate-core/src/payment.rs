//! Payment confirmation
//!
//! A gateway transaction upgrades its user at most once. The ledger row is
//! claimed atomically before the tier change, and released again if the
//! change fails, so a replayed callback either finds `success` or retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use slate_db::{PaymentLedgerRepository, RecordTransaction};
use slate_types::{ConfirmOutcome, PaymentStatus, Tier, UserEntitlement};
use tracing::{error, info, instrument, warn};

use crate::crypto::{constant_time_eq, HmacKey, HmacKeyError};
use crate::resolver::{EntitlementResolver, TierChangeReason};
use crate::token::{IssuedToken, TokenIssuer};
use crate::{EngineError, EngineResult};

/// Header carrying the gateway signature
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Validated payment callback
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub transaction_id: String,
    pub user_id: String,
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    /// Status string exactly as the gateway sent it
    pub raw_status: String,
    pub metadata: serde_json::Value,
}

/// Confirmation outcome with the refreshed snapshot and credential on upgrade
#[derive(Debug, Clone)]
pub struct ConfirmResult {
    pub outcome: ConfirmOutcome,
    pub entitlement: Option<UserEntitlement>,
    pub token: Option<IssuedToken>,
}

impl ConfirmResult {
    fn bare(outcome: ConfirmOutcome) -> Self {
        metrics::counter!("payment_confirmations_total", "outcome" => outcome.as_str())
            .increment(1);
        Self {
            outcome,
            entitlement: None,
            token: None,
        }
    }
}

/// Payment confirmation handler
#[derive(Clone)]
pub struct PaymentHandler {
    payments: Arc<dyn PaymentLedgerRepository>,
    resolver: EntitlementResolver,
    tokens: Arc<TokenIssuer>,
    gateway: String,
}

impl PaymentHandler {
    pub fn new(
        payments: Arc<dyn PaymentLedgerRepository>,
        resolver: EntitlementResolver,
        tokens: Arc<TokenIssuer>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            payments,
            resolver,
            tokens,
            gateway: gateway.into(),
        }
    }

    /// Apply a gateway callback
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, user_id = %request.user_id))]
    pub async fn confirm(&self, request: ConfirmRequest) -> EngineResult<ConfirmResult> {
        validate(&request)?;

        if let Some(existing) = self
            .payments
            .find_by_transaction_id(&request.transaction_id)
            .await?
        {
            if existing.is_success() {
                info!("Transaction already processed");
                return Ok(ConfirmResult::bare(ConfirmOutcome::AlreadyProcessed));
            }
        }

        match PaymentStatus::from_gateway(&request.raw_status) {
            PaymentStatus::Success => self.confirm_success(request).await,
            _ => self.record_failure(request).await,
        }
    }

    async fn confirm_success(&self, request: ConfirmRequest) -> EngineResult<ConfirmResult> {
        match self.resolver.get_entitlement(&request.user_id).await {
            Ok(_) => {}
            Err(EngineError::UserNotFound) => {
                warn!("Payment for unknown user, nothing recorded");
                return Ok(ConfirmResult::bare(ConfirmOutcome::UserNotFound));
            }
            Err(e) => return Err(e),
        }

        let guard = self.resolver.locks().lock(&request.user_id).await;

        let won = self.payments.claim_success(self.record(&request, None)).await?;
        if !won {
            info!("Lost ledger claim to a concurrent confirmation");
            return Ok(ConfirmResult::bare(ConfirmOutcome::AlreadyProcessed));
        }

        let entitlement = match self
            .resolver
            .apply_tier_change_held(&guard, &request.user_id, Tier::Pro, TierChangeReason::Payment)
            .await
        {
            Ok(entitlement) => entitlement,
            Err(e) => {
                error!(error = %e, "Tier upgrade failed, releasing ledger claim");
                if let Err(release) = self
                    .payments
                    .release_claim(&request.transaction_id, &e.to_string())
                    .await
                {
                    error!(error = %release, "Failed to release ledger claim");
                }
                return Err(e);
            }
        };
        drop(guard);

        let token = self.tokens.issue(&entitlement)?;

        metrics::counter!("payment_confirmations_total", "outcome" => ConfirmOutcome::Upgraded.as_str())
            .increment(1);
        info!(amount = request.amount, currency = %request.currency, "Payment confirmed, user upgraded");

        Ok(ConfirmResult {
            outcome: ConfirmOutcome::Upgraded,
            entitlement: Some(entitlement),
            token: Some(token),
        })
    }

    async fn record_failure(&self, request: ConfirmRequest) -> EngineResult<ConfirmResult> {
        let message = format!("gateway reported status '{}'", request.raw_status);
        self.payments
            .record_failure(self.record(&request, Some(message)))
            .await?;

        warn!(status = %request.raw_status, "Payment failed at gateway");
        Ok(ConfirmResult::bare(ConfirmOutcome::Rejected))
    }

    fn record(&self, request: &ConfirmRequest, error_message: Option<String>) -> RecordTransaction {
        RecordTransaction {
            transaction_id: request.transaction_id.clone(),
            user_id: request.user_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            gateway: self.gateway.clone(),
            metadata: request.metadata.clone(),
            error_message,
        }
    }
}

fn validate(request: &ConfirmRequest) -> EngineResult<()> {
    if request.transaction_id.trim().is_empty() {
        return Err(EngineError::InvalidInput("transactionId is required".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err(EngineError::InvalidInput("userId is required".to_string()));
    }
    if request.amount < 0 {
        return Err(EngineError::InvalidInput("amount must not be negative".to_string()));
    }
    if request.currency.trim().is_empty() {
        return Err(EngineError::InvalidInput("currency is required".to_string()));
    }
    Ok(())
}

/// Verifies `t=<unix>,v1=<hex hmac-sha256("t.body")>` callback signatures
#[derive(Clone, Debug)]
pub struct GatewaySignatureVerifier {
    key: HmacKey,
    tolerance: Duration,
}

impl GatewaySignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>, tolerance: Duration) -> Result<Self, HmacKeyError> {
        Ok(Self {
            key: HmacKey::new(secret)?,
            tolerance,
        })
    }

    /// Verify a signature header against the raw body
    pub fn verify(&self, payload: &[u8], header: &str) -> EngineResult<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify as of `now` (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> EngineResult<()> {
        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;

        for part in header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            warn!("Missing timestamp in gateway signature");
            EngineError::InvalidSignature("missing timestamp".to_string())
        })?;
        let sig_v1 = sig_v1.ok_or_else(|| {
            warn!("Missing v1 signature in gateway signature");
            EngineError::InvalidSignature("missing signature".to_string())
        })?;

        let expected = self.key.sign_hex(&signed_payload(timestamp, payload));
        if !constant_time_eq(sig_v1.as_bytes(), expected.as_bytes()) {
            error!("Gateway signature verification failed");
            return Err(EngineError::InvalidSignature(
                "signature verification failed".to_string(),
            ));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| EngineError::InvalidSignature("invalid timestamp format".to_string()))?;
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if (now - ts).abs() > tolerance {
            warn!(timestamp = ts, now, "Gateway signature timestamp outside tolerance");
            return Err(EngineError::InvalidSignature("timestamp too old".to_string()));
        }

        Ok(())
    }

    /// Build a signature header for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let ts = timestamp.to_string();
        format!("t={},v1={}", ts, self.key.sign_hex(&signed_payload(&ts, payload)))
    }
}

fn signed_payload(timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);
    signed
}
