//! Entitlement resolver
//!
//! The only writer of the quota store. Mutations run under the user's lock and
//! are additionally guarded by conditional statements in the store. Once the
//! grace period of a scheduled deletion has elapsed the account is frozen:
//! every mutation fails with [`EngineError::AccountDeleting`] until the
//! sweeper removes it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use slate_db::{CreateEntitlement, EntitlementRepository, TierLimitsUpdate};
use slate_types::{ShotAllowance, Tier, UserEntitlement};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::locks::{UserGuard, UserLocks};
use crate::{EngineError, EngineResult};

/// What caused a tier change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierChangeReason {
    /// Gateway confirmed a payment
    Payment,
    /// Promo code redeemed
    Promo,
    /// Invariant repair or operator action
    Admin,
}

impl TierChangeReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Promo => "promo",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for TierChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entitlement resolver
#[derive(Clone)]
pub struct EntitlementResolver {
    entitlements: Arc<dyn EntitlementRepository>,
    locks: UserLocks,
    deletion_grace: Duration,
}

impl EntitlementResolver {
    /// Create a resolver over the quota store
    pub fn new(entitlements: Arc<dyn EntitlementRepository>, locks: UserLocks) -> Self {
        Self {
            entitlements,
            locks,
            deletion_grace: EngineConfig::default().grace_period(),
        }
    }

    /// Set the grace period after which a scheduled account is frozen
    pub fn with_deletion_grace(mut self, grace: Duration) -> Self {
        self.deletion_grace = grace;
        self
    }

    /// Lock registry shared with the other services
    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Current snapshot
    pub async fn get_entitlement(&self, user_id: &str) -> EngineResult<UserEntitlement> {
        let row = self
            .entitlements
            .find_by_id(user_id)
            .await?
            .ok_or(EngineError::UserNotFound)?;
        Ok(row.try_into()?)
    }

    /// Snapshot of an account that may still be mutated
    pub async fn active_entitlement(
        &self,
        guard: &UserGuard,
        user_id: &str,
    ) -> EngineResult<UserEntitlement> {
        check_guard(guard, user_id)?;
        let entitlement = self.get_entitlement(user_id).await?;
        self.ensure_not_deleting(&entitlement)?;
        Ok(entitlement)
    }

    /// Snapshot, creating free defaults on first authentication
    pub async fn get_or_create(&self, user_id: &str, email: &str) -> EngineResult<UserEntitlement> {
        let guard = self.locks.lock(user_id).await;
        self.get_or_create_held(&guard, user_id, email).await
    }

    /// [`Self::get_or_create`] for callers already holding the user's lock
    #[instrument(skip(self, guard, email))]
    pub async fn get_or_create_held(
        &self,
        guard: &UserGuard,
        user_id: &str,
        email: &str,
    ) -> EngineResult<UserEntitlement> {
        check_guard(guard, user_id)?;

        let limits = Tier::Free.limits();
        let row = self
            .entitlements
            .create_if_absent(CreateEntitlement {
                user_id: user_id.to_string(),
                email: email.to_string(),
                tier: Tier::Free.as_str().to_string(),
                total_pages: limits.total_pages,
                max_shots_per_scene: limits.max_shots_per_scene,
                can_generate_storyboards: limits.can_generate_storyboards,
            })
            .await?;
        let entitlement: UserEntitlement = row.try_into()?;
        self.ensure_not_deleting(&entitlement)?;

        if entitlement.satisfies_tier_invariant() {
            return Ok(entitlement);
        }

        warn!(user_id, tier = %entitlement.tier, "Repairing limits that drifted from tier");
        self.apply_tier_change_held(guard, user_id, entitlement.tier, TierChangeReason::Admin)
            .await
    }

    /// Set the tier and its derived limits.
    ///
    /// Re-applying the current tier is a no-op. A downgrade keeps `usedPages`.
    pub async fn apply_tier_change(
        &self,
        user_id: &str,
        tier: Tier,
        reason: TierChangeReason,
    ) -> EngineResult<UserEntitlement> {
        let guard = self.locks.lock(user_id).await;
        self.apply_tier_change_held(&guard, user_id, tier, reason).await
    }

    /// [`Self::apply_tier_change`] for callers already holding the user's lock
    #[instrument(skip(self, guard))]
    pub async fn apply_tier_change_held(
        &self,
        guard: &UserGuard,
        user_id: &str,
        tier: Tier,
        reason: TierChangeReason,
    ) -> EngineResult<UserEntitlement> {
        let mut entitlement = self.active_entitlement(guard, user_id).await?;
        if !entitlement.apply_tier(tier) {
            debug!(user_id, %tier, "Tier already applied");
            return Ok(entitlement);
        }

        let limits = tier.limits();
        let row = self
            .entitlements
            .update_tier_limits(
                user_id,
                TierLimitsUpdate {
                    tier: tier.as_str().to_string(),
                    total_pages: limits.total_pages,
                    max_shots_per_scene: limits.max_shots_per_scene,
                    can_generate_storyboards: limits.can_generate_storyboards,
                },
            )
            .await?
            .ok_or(EngineError::UserNotFound)?;

        metrics::counter!(
            "entitlement_tier_changes_total",
            "tier" => tier.as_str(),
            "reason" => reason.as_str()
        )
        .increment(1);
        info!(user_id, %tier, %reason, "Tier changed");

        Ok(row.try_into()?)
    }

    /// Consume `pages` from the allowance
    #[instrument(skip(self))]
    pub async fn record_usage(&self, user_id: &str, pages: i32) -> EngineResult<UserEntitlement> {
        if pages <= 0 {
            return Err(EngineError::InvalidInput(
                "pages must be a positive integer".to_string(),
            ));
        }

        let guard = self.locks.lock(user_id).await;
        self.active_entitlement(&guard, user_id).await?;

        if let Some(row) = self.entitlements.try_consume_pages(user_id, pages).await? {
            return Ok(row.try_into()?);
        }

        let current = self
            .entitlements
            .find_by_id(user_id)
            .await?
            .ok_or(EngineError::UserNotFound)?;

        debug!(
            user_id,
            used = current.used_pages,
            total = current.total_pages,
            "Page quota exceeded"
        );
        Err(EngineError::QuotaExceeded {
            requested: pages,
            used: current.used_pages,
            total: current.total_pages,
        })
    }

    /// Clamp a generated shot count to the user's per-scene cap.
    ///
    /// Never fails: when the entitlement cannot be read the free cap applies.
    pub async fn enforce_shot_limit(&self, user_id: &str, requested: u32) -> ShotAllowance {
        match self.get_entitlement(user_id).await {
            Ok(entitlement) => entitlement.clamp_shots(requested),
            Err(e) => {
                warn!(user_id, error = %e, "Entitlement unavailable, applying free shot cap");
                ShotAllowance::clamp(requested, Tier::Free.limits().max_shots_per_scene)
            }
        }
    }

    /// Start the grace period; an existing schedule is kept
    #[instrument(skip(self))]
    pub async fn schedule_deletion(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<UserEntitlement> {
        let _guard = self.locks.lock(user_id).await;

        let current = self.get_entitlement(user_id).await?;
        if current.deletion_scheduled_at.is_some() {
            return Ok(current);
        }

        let row = self
            .entitlements
            .set_deletion_scheduled_at(user_id, Some(at))
            .await?
            .ok_or(EngineError::UserNotFound)?;
        info!(user_id, scheduled_at = %at, "Account deletion scheduled");
        Ok(row.try_into()?)
    }

    /// Withdraw a pending deletion; refused once the grace period has elapsed
    #[instrument(skip(self))]
    pub async fn cancel_deletion(&self, user_id: &str) -> EngineResult<UserEntitlement> {
        let guard = self.locks.lock(user_id).await;

        let current = self.active_entitlement(&guard, user_id).await?;
        if current.deletion_scheduled_at.is_none() {
            return Ok(current);
        }

        let row = self
            .entitlements
            .set_deletion_scheduled_at(user_id, None)
            .await?
            .ok_or(EngineError::UserNotFound)?;
        info!(user_id, "Account deletion cancelled");
        Ok(row.try_into()?)
    }
}

impl EntitlementResolver {
    fn ensure_not_deleting(&self, entitlement: &UserEntitlement) -> EngineResult<()> {
        if entitlement.deletion_due(Utc::now(), self.deletion_grace) {
            warn!(user_id = %entitlement.user_id, "Mutation refused, account is being deleted");
            return Err(EngineError::AccountDeleting);
        }
        Ok(())
    }
}

fn check_guard(guard: &UserGuard, user_id: &str) -> EngineResult<()> {
    if guard.covers(user_id) {
        Ok(())
    } else {
        Err(EngineError::Internal(format!(
            "lock for {} used to change {}",
            guard.user_id(),
            user_id
        )))
    }
}

impl std::fmt::Debug for EntitlementResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementResolver")
            .field("locks", &self.locks)
            .field("deletion_grace", &self.deletion_grace)
            .finish_non_exhaustive()
    }
}
