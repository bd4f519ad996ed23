//! PostgreSQL banned identity repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::repo::{BanRepository, CreateBan};

/// PostgreSQL ban repository
#[derive(Clone)]
pub struct PgBanRepository {
    pool: PgPool,
}

impl PgBanRepository {
    /// Create a new ban repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanRepository for PgBanRepository {
    async fn is_banned(&self, user_id: &str, email: &str) -> DbResult<bool> {
        let banned: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM banned_identities
                WHERE (kind = 'uid' AND identifier = $1)
                   OR (kind = 'email' AND identifier = $2)
            )
            "#,
        )
        .bind(user_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(banned.0)
    }

    async fn ban(&self, ban: CreateBan) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO banned_identities (kind, identifier, user_id, reason)
            VALUES ('uid', $1, $1, $3), ('email', $2, $1, $3)
            ON CONFLICT (kind, identifier) DO NOTHING
            "#,
        )
        .bind(&ban.user_id)
        .bind(&ban.email)
        .bind(&ban.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
