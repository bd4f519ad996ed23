//! Repository traits
//!
//! Define async repository interfaces for database operations. Every method
//! that guards an invariant does so with a single conditional statement so
//! that concurrent callers cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::*;

/// Entitlement (quota store) repository trait
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Find an entitlement by user ID
    async fn find_by_id(&self, user_id: &str) -> DbResult<Option<EntitlementRow>>;

    /// Insert the entitlement unless one exists, returning the stored row
    async fn create_if_absent(&self, entitlement: CreateEntitlement) -> DbResult<EntitlementRow>;

    /// Overwrite tier and derived limits; `usedPages` is untouched
    async fn update_tier_limits(
        &self,
        user_id: &str,
        limits: TierLimitsUpdate,
    ) -> DbResult<Option<EntitlementRow>>;

    /// Add `pages` to `used_pages` if the allowance permits it and log the usage.
    ///
    /// Returns `None` when the row is missing or the allowance would be exceeded.
    async fn try_consume_pages(&self, user_id: &str, pages: i32)
        -> DbResult<Option<EntitlementRow>>;

    /// Set or clear the deletion schedule
    async fn set_deletion_scheduled_at(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> DbResult<Option<EntitlementRow>>;

    /// Accounts whose deletion was scheduled at or before `cutoff`
    async fn find_due_for_deletion(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<EntitlementRow>>;

    /// Delete the page usage log of a user
    async fn delete_usage_for_user(&self, user_id: &str) -> DbResult<u64>;

    /// Delete the entitlement row
    async fn delete(&self, user_id: &str) -> DbResult<u64>;
}

/// Create entitlement input
#[derive(Debug, Clone)]
pub struct CreateEntitlement {
    pub user_id: String,
    pub email: String,
    pub tier: String,
    pub total_pages: i32,
    pub max_shots_per_scene: i32,
    pub can_generate_storyboards: bool,
}

/// Tier and derived limits written together
#[derive(Debug, Clone)]
pub struct TierLimitsUpdate {
    pub tier: String,
    pub total_pages: i32,
    pub max_shots_per_scene: i32,
    pub can_generate_storyboards: bool,
}

/// Promo code registry repository trait
#[async_trait]
pub trait PromoRepository: Send + Sync {
    /// Find a code (already normalized)
    async fn find_code(&self, code: &str) -> DbResult<Option<PromoCodeRow>>;

    /// Find a user's redemption of a code
    async fn find_redemption(&self, code: &str, user_id: &str)
        -> DbResult<Option<PromoRedemptionRow>>;

    /// Redemptions of a code from a source IP since `since`
    async fn count_redemptions_from_ip(
        &self,
        code: &str,
        source_ip: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64>;

    /// Insert a redemption; fails with `UniqueViolation` if `(code, user_id)` exists
    async fn create_redemption(&self, redemption: CreateRedemption)
        -> DbResult<PromoRedemptionRow>;

    /// Remove a redemption (compensation)
    async fn delete_redemption(&self, code: &str, user_id: &str) -> DbResult<u64>;

    /// Increment `used_count` if the global cap permits it
    async fn claim_use(&self, code: &str) -> DbResult<bool>;

    /// Give back a previously claimed use
    async fn release_use(&self, code: &str) -> DbResult<()>;

    /// Delete all redemptions made by a user
    async fn delete_redemptions_for_user(&self, user_id: &str) -> DbResult<u64>;
}

/// Create redemption input
#[derive(Debug, Clone)]
pub struct CreateRedemption {
    pub id: Uuid,
    pub code: String,
    pub user_id: String,
    pub email: String,
    pub applied_tier: String,
    pub source_ip: Option<String>,
}

/// Payment transaction ledger trait
#[async_trait]
pub trait PaymentLedgerRepository: Send + Sync {
    /// Find a ledger row by gateway transaction ID
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> DbResult<Option<PaymentTransactionRow>>;

    /// Mark the transaction `success` unless it already is.
    ///
    /// Returns `true` for the single caller that won the claim.
    async fn claim_success(&self, record: RecordTransaction) -> DbResult<bool>;

    /// Return a won claim to `pending` after its side effects failed
    async fn release_claim(&self, transaction_id: &str, error_message: &str) -> DbResult<()>;

    /// Record a failed payment; a `success` row is never overwritten
    async fn record_failure(&self, record: RecordTransaction) -> DbResult<()>;
}

/// Ledger write input
#[derive(Debug, Clone)]
pub struct RecordTransaction {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub gateway: String,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
}

/// Banned identities repository trait
#[async_trait]
pub trait BanRepository: Send + Sync {
    /// Whether the UID or the email is banned
    async fn is_banned(&self, user_id: &str, email: &str) -> DbResult<bool>;

    /// Record a ban; re-banning is a no-op
    async fn ban(&self, ban: CreateBan) -> DbResult<()>;
}

/// Ban input
#[derive(Debug, Clone)]
pub struct CreateBan {
    pub user_id: String,
    pub email: String,
    pub reason: String,
}

/// Owned content repository trait (deletion contract only)
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// IDs of the scripts a user owns
    async fn list_script_ids(&self, user_id: &str) -> DbResult<Vec<i64>>;

    /// Delete the shots of every parse job of a script
    async fn delete_shots_for_script(&self, script_id: i64) -> DbResult<u64>;

    /// Delete the parse jobs of a script
    async fn delete_parse_jobs_for_script(&self, script_id: i64) -> DbResult<u64>;

    /// Delete a script
    async fn delete_script(&self, script_id: i64) -> DbResult<u64>;

    /// Delete a user's script analyses
    async fn delete_analyses_for_user(&self, user_id: &str) -> DbResult<u64>;
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: CreateSession) -> DbResult<SessionRow>;

    /// Delete all sessions of a user
    async fn delete_for_user(&self, user_id: &str) -> DbResult<u64>;
}

/// Create session input
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub id: Uuid,
    pub user_id: String,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}
