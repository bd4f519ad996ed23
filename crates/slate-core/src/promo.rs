//! Promo code redemption
//!
//! Checks run in a fixed order and the first failing one decides the
//! rejection. The redemption row, the global use and the tier change are
//! applied together; if a later part fails the earlier ones are undone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slate_db::{CreateRedemption, DbError, PromoRepository};
use slate_types::{normalize_code, PromoCode, PromoOutcome, PromoRejection, UserEntitlement};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::resolver::{EntitlementResolver, TierChangeReason};
use crate::token::{IssuedToken, TokenIssuer};
use crate::EngineResult;

/// Promo submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub code: String,
    pub user_id: String,
    pub email: String,
    pub source_ip: Option<String>,
}

/// Outcome plus the refreshed snapshot and credential when a tier was applied
#[derive(Debug, Clone)]
pub struct RedeemResult {
    pub outcome: PromoOutcome,
    pub entitlement: Option<UserEntitlement>,
    pub token: Option<IssuedToken>,
}

impl RedeemResult {
    fn rejected(reason: PromoRejection) -> Self {
        metrics::counter!("promo_redemptions_total", "outcome" => reason.code()).increment(1);
        Self {
            outcome: PromoOutcome::Rejected { reason },
            entitlement: None,
            token: None,
        }
    }
}

/// Promo redemption service
#[derive(Clone)]
pub struct PromoService {
    promos: Arc<dyn PromoRepository>,
    resolver: EntitlementResolver,
    tokens: Arc<TokenIssuer>,
    config: EngineConfig,
}

impl PromoService {
    pub fn new(
        promos: Arc<dyn PromoRepository>,
        resolver: EntitlementResolver,
        tokens: Arc<TokenIssuer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            promos,
            resolver,
            tokens,
            config,
        }
    }

    /// Redeem a code for a user
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn redeem(&self, request: RedeemRequest) -> EngineResult<RedeemResult> {
        let code = normalize_code(&request.code);
        let now = Utc::now();

        let promo: PromoCode = match self.promos.find_code(&code).await? {
            Some(row) if row.active => row.try_into()?,
            _ => return Ok(RedeemResult::rejected(PromoRejection::CodeNotFound)),
        };

        if promo.is_expired(now) {
            return Ok(RedeemResult::rejected(PromoRejection::CodeExpired));
        }
        if promo.is_exhausted() {
            return Ok(RedeemResult::rejected(PromoRejection::CodeExhausted));
        }
        if self
            .promos
            .find_redemption(&code, &request.user_id)
            .await?
            .is_some()
        {
            return Ok(RedeemResult::rejected(PromoRejection::AlreadyRedeemed));
        }
        let over_ip_limit = self.ip_redemptions(&promo, &request, now).await?;
        if matches!(over_ip_limit, Some(over) if over >= 0) {
            return Ok(RedeemResult::rejected(PromoRejection::RateLimited));
        }

        let guard = self.resolver.locks().lock(&request.user_id).await;
        self.resolver.active_entitlement(&guard, &request.user_id).await?;

        let created = self
            .promos
            .create_redemption(CreateRedemption {
                id: Uuid::new_v4(),
                code: code.clone(),
                user_id: request.user_id.clone(),
                email: request.email.clone(),
                applied_tier: promo.tier.as_str().to_string(),
                source_ip: request.source_ip.clone(),
            })
            .await;
        match created {
            Ok(_) => {}
            Err(DbError::UniqueViolation(_)) => {
                return Ok(RedeemResult::rejected(PromoRejection::AlreadyRedeemed));
            }
            Err(e) => return Err(e.into()),
        }

        // Other users may redeem from the same address concurrently; the
        // count now includes this row.
        match self.ip_redemptions(&promo, &request, now).await {
            Ok(Some(over)) if over > 0 => {
                self.undo_redemption(&code, &request.user_id, false).await;
                return Ok(RedeemResult::rejected(PromoRejection::RateLimited));
            }
            Ok(_) => {}
            Err(e) => {
                self.undo_redemption(&code, &request.user_id, false).await;
                return Err(e);
            }
        }

        match self.promos.claim_use(&code).await {
            Ok(true) => {}
            Ok(false) => {
                self.undo_redemption(&code, &request.user_id, false).await;
                return Ok(RedeemResult::rejected(PromoRejection::CodeExhausted));
            }
            Err(e) => {
                self.undo_redemption(&code, &request.user_id, false).await;
                return Err(e.into());
            }
        }

        let entitlement = match self
            .resolver
            .apply_tier_change_held(&guard, &request.user_id, promo.tier, TierChangeReason::Promo)
            .await
        {
            Ok(entitlement) => entitlement,
            Err(e) => {
                self.undo_redemption(&code, &request.user_id, true).await;
                return Err(e);
            }
        };
        drop(guard);

        let token = self.tokens.issue(&entitlement)?;

        metrics::counter!("promo_redemptions_total", "outcome" => "applied").increment(1);
        info!(code = %code, tier = %promo.tier, "Promo code applied");

        Ok(RedeemResult {
            outcome: PromoOutcome::Applied { tier: promo.tier },
            entitlement: Some(entitlement),
            token: Some(token),
        })
    }

    /// Redemptions from the request's address in the window, minus the
    /// per-IP limit; `None` when the code or request has no limit to apply
    async fn ip_redemptions(
        &self,
        promo: &PromoCode,
        request: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<i64>> {
        let (Some(limit), Some(ip)) = (promo.max_uses_per_ip, request.source_ip.as_deref()) else {
            return Ok(None);
        };
        let since = now - self.config.promo_window();
        let recent = self
            .promos
            .count_redemptions_from_ip(&promo.code, ip, since)
            .await?;
        Ok(Some(recent - i64::from(limit)))
    }

    async fn undo_redemption(&self, code: &str, user_id: &str, release_use: bool) {
        if let Err(e) = self.promos.delete_redemption(code, user_id).await {
            error!(code, user_id, error = %e, "Failed to remove redemption during compensation");
        }
        if release_use {
            if let Err(e) = self.promos.release_use(code).await {
                error!(code, error = %e, "Failed to release promo use during compensation");
            }
        }
    }
}
