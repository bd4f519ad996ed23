//! Promo code types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Tier, UserId};

/// Promo code definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    /// Normalized code (upper-case)
    pub code: String,
    /// Tier granted on redemption
    pub tier: Tier,
    /// Whether the code can currently be redeemed
    pub active: bool,
    /// Expiry, if any
    pub expires_at: Option<DateTime<Utc>>,
    /// Global usage cap, if any
    pub max_uses: Option<i32>,
    /// Redemptions so far
    pub used_count: i32,
    /// Redemptions allowed per source IP in a rolling day, if limited
    pub max_uses_per_ip: Option<i32>,
}

impl PromoCode {
    /// Whether the code has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Whether the global cap has been reached
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }
}

/// A single applied redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoRedemption {
    pub code: String,
    pub user_id: UserId,
    pub email: String,
    pub applied_tier: Tier,
    pub applied_at: DateTime<Utc>,
    pub source_ip: Option<String>,
}

/// Why a promo submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromoRejection {
    /// Unknown or deactivated code
    CodeNotFound,
    /// Past its expiry
    CodeExpired,
    /// Global cap reached
    CodeExhausted,
    /// This user already redeemed it
    AlreadyRedeemed,
    /// Too many redemptions from the source IP
    RateLimited,
}

impl PromoRejection {
    /// Error code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::CodeExhausted => "CODE_EXHAUSTED",
            Self::AlreadyRedeemed => "ALREADY_REDEEMED",
            Self::RateLimited => "RATE_LIMITED",
        }
    }

    /// Human readable message
    pub const fn message(&self) -> &'static str {
        match self {
            Self::CodeNotFound => "promo code not found",
            Self::CodeExpired => "promo code has expired",
            Self::CodeExhausted => "promo code usage limit reached",
            Self::AlreadyRedeemed => "promo code already redeemed by this user",
            Self::RateLimited => "too many promo redemptions from this address",
        }
    }
}

impl std::fmt::Display for PromoRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of a redemption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromoOutcome {
    /// Code accepted and the tier applied
    Applied { tier: Tier },
    /// Code refused
    Rejected { reason: PromoRejection },
}

/// Normalize a user-entered promo code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
