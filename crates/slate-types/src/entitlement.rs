//! Entitlement snapshot and quota arithmetic

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Tier, UserId, UNLIMITED};

/// Resolved permissions and limits for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntitlement {
    /// Stable identifier
    pub user_id: UserId,
    /// Contact address
    pub email: String,
    /// Current tier
    pub tier: Tier,
    /// Pages consumed so far
    pub used_pages: i32,
    /// Page allowance (`-1` for unlimited)
    pub total_pages: i32,
    /// Shots kept per scene (`-1` for unlimited)
    pub max_shots_per_scene: i32,
    /// Storyboard generation enabled
    pub can_generate_storyboards: bool,
    /// Set when the owner asked for the account to be deleted
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl UserEntitlement {
    /// Entitlement granted at first authentication
    pub fn new_free(user_id: UserId, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        let limits = Tier::Free.limits();
        Self {
            user_id,
            email: email.into(),
            tier: Tier::Free,
            used_pages: 0,
            total_pages: limits.total_pages,
            max_shots_per_scene: limits.max_shots_per_scene,
            can_generate_storyboards: limits.can_generate_storyboards,
            deletion_scheduled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the tier and every limit derived from it.
    ///
    /// Returns `false` when the snapshot already carried exactly these values.
    pub fn apply_tier(&mut self, tier: Tier) -> bool {
        let limits = tier.limits();
        let unchanged = self.tier == tier
            && self.total_pages == limits.total_pages
            && self.max_shots_per_scene == limits.max_shots_per_scene
            && self.can_generate_storyboards == limits.can_generate_storyboards;
        if unchanged {
            return false;
        }

        self.tier = tier;
        self.total_pages = limits.total_pages;
        self.max_shots_per_scene = limits.max_shots_per_scene;
        self.can_generate_storyboards = limits.can_generate_storyboards;
        true
    }

    /// `tier = pro` implies unlimited pages and shots plus storyboards
    pub fn satisfies_tier_invariant(&self) -> bool {
        match self.tier {
            Tier::Pro => {
                self.total_pages == UNLIMITED
                    && self.max_shots_per_scene == UNLIMITED
                    && self.can_generate_storyboards
            }
            Tier::Free => true,
        }
    }

    /// Whether the page allowance is unlimited
    pub fn has_unlimited_pages(&self) -> bool {
        self.total_pages == UNLIMITED
    }

    /// Pages left in the allowance, `None` when unlimited
    pub fn remaining_pages(&self) -> Option<i32> {
        if self.has_unlimited_pages() {
            None
        } else {
            Some((self.total_pages - self.used_pages).max(0))
        }
    }

    /// Whether `pages` more pages fit in the allowance
    pub fn can_consume(&self, pages: i32) -> bool {
        self.has_unlimited_pages()
            || i64::from(self.used_pages) + i64::from(pages) <= i64::from(self.total_pages)
    }

    /// Clamp a generated shot count to this entitlement's per-scene cap
    pub fn clamp_shots(&self, requested: u32) -> ShotAllowance {
        ShotAllowance::clamp(requested, self.max_shots_per_scene)
    }

    /// Whether the grace period of a scheduled deletion has elapsed
    pub fn deletion_due(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.deletion_scheduled_at
            .is_some_and(|scheduled| scheduled + grace <= now)
    }

    /// Lifecycle state as seen at `now`
    pub fn account_state(&self, now: DateTime<Utc>, grace: Duration) -> AccountState {
        match self.deletion_scheduled_at {
            None => AccountState::Active,
            Some(_) if self.deletion_due(now, grace) => AccountState::Deleting,
            Some(_) => AccountState::PendingDeletion,
        }
    }
}

/// Account lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    /// Normal account
    Active,
    /// Deletion requested, grace period running
    PendingDeletion,
    /// Grace period elapsed, cascade eligible
    Deleting,
    /// Removed and banned
    Gone,
}

/// Result of clamping a shot count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotAllowance {
    /// Shots the caller may keep
    pub allowed_shots: u32,
    /// Whether the cap reduced the count
    pub limit_applied: bool,
}

impl ShotAllowance {
    /// Clamp `requested` to `cap` (`-1` means no cap)
    pub fn clamp(requested: u32, cap: i32) -> Self {
        match u32::try_from(cap) {
            Ok(cap) if requested > cap => Self {
                allowed_shots: cap,
                limit_applied: true,
            },
            _ => Self {
                allowed_shots: requested,
                limit_applied: false,
            },
        }
    }
}
