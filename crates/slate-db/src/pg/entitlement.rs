//! PostgreSQL entitlement repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::EntitlementRow;
use crate::repo::{CreateEntitlement, EntitlementRepository, TierLimitsUpdate};

const COLUMNS: &str = "user_id, email, tier, used_pages, total_pages, max_shots_per_scene, \
                       can_generate_storyboards, deletion_scheduled_at, created_at, updated_at";

/// PostgreSQL entitlement repository
#[derive(Clone)]
pub struct PgEntitlementRepository {
    pool: PgPool,
}

impl PgEntitlementRepository {
    /// Create a new entitlement repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementRepository for PgEntitlementRepository {
    async fn find_by_id(&self, user_id: &str) -> DbResult<Option<EntitlementRow>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {COLUMNS} FROM user_entitlements WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn create_if_absent(&self, entitlement: CreateEntitlement) -> DbResult<EntitlementRow> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            r#"
            INSERT INTO user_entitlements
                (user_id, email, tier, used_pages, total_pages, max_shots_per_scene,
                 can_generate_storyboards)
            VALUES ($1, $2, $3, 0, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&entitlement.user_id)
        .bind(&entitlement.email)
        .bind(&entitlement.tier)
        .bind(entitlement.total_pages)
        .bind(entitlement.max_shots_per_scene)
        .bind(entitlement.can_generate_storyboards)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_tier_limits(
        &self,
        user_id: &str,
        limits: TierLimitsUpdate,
    ) -> DbResult<Option<EntitlementRow>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            r#"
            UPDATE user_entitlements
            SET tier = $2, total_pages = $3, max_shots_per_scene = $4,
                can_generate_storyboards = $5, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&limits.tier)
        .bind(limits.total_pages)
        .bind(limits.max_shots_per_scene)
        .bind(limits.can_generate_storyboards)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn try_consume_pages(
        &self,
        user_id: &str,
        pages: i32,
    ) -> DbResult<Option<EntitlementRow>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            r#"
            UPDATE user_entitlements
            SET used_pages = used_pages + $2, updated_at = NOW()
            WHERE user_id = $1
              AND (total_pages = -1 OR used_pages::BIGINT + $2 <= total_pages)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(pages)
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_some() {
            sqlx::query("INSERT INTO page_usage (user_id, pages) VALUES ($1, $2)")
                .bind(user_id)
                .bind(pages)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn set_deletion_scheduled_at(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> DbResult<Option<EntitlementRow>> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            r#"
            UPDATE user_entitlements
            SET deletion_scheduled_at = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_due_for_deletion(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<EntitlementRow>> {
        let rows = sqlx::query_as::<_, EntitlementRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM user_entitlements
            WHERE deletion_scheduled_at IS NOT NULL AND deletion_scheduled_at <= $1
            ORDER BY deletion_scheduled_at
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_usage_for_user(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM page_usage WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM user_entitlements WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
