//! PostgreSQL promo code repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::{PromoCodeRow, PromoRedemptionRow};
use crate::repo::{CreateRedemption, PromoRepository};

/// PostgreSQL promo repository
#[derive(Clone)]
pub struct PgPromoRepository {
    pool: PgPool,
}

impl PgPromoRepository {
    /// Create a new promo repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromoRepository for PgPromoRepository {
    async fn find_code(&self, code: &str) -> DbResult<Option<PromoCodeRow>> {
        let row = sqlx::query_as::<_, PromoCodeRow>(
            r#"
            SELECT code, tier, active, expires_at, max_uses, used_count,
                   max_uses_per_ip, created_at
            FROM promo_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_redemption(
        &self,
        code: &str,
        user_id: &str,
    ) -> DbResult<Option<PromoRedemptionRow>> {
        let row = sqlx::query_as::<_, PromoRedemptionRow>(
            r#"
            SELECT id, code, user_id, email, applied_tier, source_ip, applied_at
            FROM promo_redemptions
            WHERE code = $1 AND user_id = $2
            "#,
        )
        .bind(code)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn count_redemptions_from_ip(
        &self,
        code: &str,
        source_ip: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM promo_redemptions
            WHERE code = $1 AND source_ip = $2 AND applied_at >= $3
            "#,
        )
        .bind(code)
        .bind(source_ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    async fn create_redemption(
        &self,
        redemption: CreateRedemption,
    ) -> DbResult<PromoRedemptionRow> {
        let row = sqlx::query_as::<_, PromoRedemptionRow>(
            r#"
            INSERT INTO promo_redemptions (id, code, user_id, email, applied_tier, source_ip)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, code, user_id, email, applied_tier, source_ip, applied_at
            "#,
        )
        .bind(redemption.id)
        .bind(&redemption.code)
        .bind(&redemption.user_id)
        .bind(&redemption.email)
        .bind(&redemption.applied_tier)
        .bind(&redemption.source_ip)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete_redemption(&self, code: &str, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM promo_redemptions WHERE code = $1 AND user_id = $2")
            .bind(code)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn claim_use(&self, code: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET used_count = used_count + 1
            WHERE code = $1 AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_use(&self, code: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE promo_codes SET used_count = used_count - 1 WHERE code = $1 AND used_count > 0",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_redemptions_for_user(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM promo_redemptions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
