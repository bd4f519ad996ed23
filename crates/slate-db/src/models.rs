//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use chrono::{DateTime, Utc};
use slate_types::{PaymentStatus, PromoCode, PromoRedemption, Tier, UserEntitlement, UserId};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbError;

/// Entitlement row from the database
#[derive(Debug, Clone, FromRow)]
pub struct EntitlementRow {
    pub user_id: String,
    pub email: String,
    pub tier: String,
    pub used_pages: i32,
    pub total_pages: i32,
    pub max_shots_per_scene: i32,
    pub can_generate_storyboards: bool,
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for UserEntitlement {
    type Error = DbError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let tier: Tier = row
            .tier
            .parse()
            .map_err(|e| DbError::Corrupt(format!("user_entitlements.tier: {e}")))?;

        Ok(Self {
            user_id: UserId::new(row.user_id),
            email: row.email,
            tier,
            used_pages: row.used_pages,
            total_pages: row.total_pages,
            max_shots_per_scene: row.max_shots_per_scene,
            can_generate_storyboards: row.can_generate_storyboards,
            deletion_scheduled_at: row.deletion_scheduled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Promo code row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PromoCodeRow {
    pub code: String,
    pub tier: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub max_uses_per_ip: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PromoCodeRow> for PromoCode {
    type Error = DbError;

    fn try_from(row: PromoCodeRow) -> Result<Self, Self::Error> {
        let tier: Tier = row
            .tier
            .parse()
            .map_err(|e| DbError::Corrupt(format!("promo_codes.tier: {e}")))?;

        Ok(Self {
            code: row.code,
            tier,
            active: row.active,
            expires_at: row.expires_at,
            max_uses: row.max_uses,
            used_count: row.used_count,
            max_uses_per_ip: row.max_uses_per_ip,
        })
    }
}

/// Promo redemption row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PromoRedemptionRow {
    pub id: Uuid,
    pub code: String,
    pub user_id: String,
    pub email: String,
    pub applied_tier: String,
    pub source_ip: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl TryFrom<PromoRedemptionRow> for PromoRedemption {
    type Error = DbError;

    fn try_from(row: PromoRedemptionRow) -> Result<Self, Self::Error> {
        let applied_tier: Tier = row
            .applied_tier
            .parse()
            .map_err(|e| DbError::Corrupt(format!("promo_redemptions.applied_tier: {e}")))?;

        Ok(Self {
            code: row.code,
            user_id: UserId::new(row.user_id),
            email: row.email,
            applied_tier,
            applied_at: row.applied_at,
            source_ip: row.source_ip,
        })
    }
}

/// Payment ledger row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PaymentTransactionRow {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub gateway: String,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransactionRow {
    /// Parsed ledger status
    pub fn status(&self) -> Result<PaymentStatus, DbError> {
        self.status
            .parse()
            .map_err(|e| DbError::Corrupt(format!("payment_transactions.status: {e}")))
    }

    /// Whether the side effects of this transaction were applied
    pub fn is_success(&self) -> bool {
        matches!(self.status(), Ok(PaymentStatus::Success))
    }
}

/// Banned identity row from the database
#[derive(Debug, Clone, FromRow)]
pub struct BannedIdentityRow {
    /// `uid` or `email`
    pub kind: String,
    pub identifier: String,
    /// Account the ban was recorded for
    pub user_id: String,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
}

/// Session row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
