//! PostgreSQL owned-content repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::repo::ContentRepository;

/// PostgreSQL content repository
#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    /// Create a new content repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn list_script_ids(&self, user_id: &str) -> DbResult<Vec<i64>> {
        let ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM scripts WHERE user_id = $1 ORDER BY id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn delete_shots_for_script(&self, script_id: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM shots
            WHERE parse_job_id IN (SELECT id FROM parse_jobs WHERE script_id = $1)
            "#,
        )
        .bind(script_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_parse_jobs_for_script(&self, script_id: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM parse_jobs WHERE script_id = $1")
            .bind(script_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_script(&self, script_id: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM scripts WHERE id = $1")
            .bind(script_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_analyses_for_user(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM script_analyses WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
