//! PostgreSQL payment ledger implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::PaymentTransactionRow;
use crate::repo::{PaymentLedgerRepository, RecordTransaction};

/// PostgreSQL payment ledger
#[derive(Clone)]
pub struct PgPaymentLedgerRepository {
    pool: PgPool,
}

impl PgPaymentLedgerRepository {
    /// Create a new payment ledger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentLedgerRepository for PgPaymentLedgerRepository {
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> DbResult<Option<PaymentTransactionRow>> {
        let row = sqlx::query_as::<_, PaymentTransactionRow>(
            r#"
            SELECT transaction_id, user_id, amount, currency, status, gateway,
                   metadata, error_message, created_at, updated_at
            FROM payment_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn claim_success(&self, record: RecordTransaction) -> DbResult<bool> {
        // RETURNING yields no row when the WHERE on the conflict branch rejects,
        // i.e. when another caller already holds the success claim.
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_transactions
                (transaction_id, user_id, amount, currency, status, gateway, metadata)
            VALUES ($1, $2, $3, $4, 'success', $5, $6)
            ON CONFLICT (transaction_id) DO UPDATE
            SET status = 'success', error_message = NULL, updated_at = NOW()
            WHERE payment_transactions.status <> 'success'
            RETURNING transaction_id
            "#,
        )
        .bind(&record.transaction_id)
        .bind(&record.user_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.gateway)
        .bind(&record.metadata)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn release_claim(&self, transaction_id: &str, error_message: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'pending', error_message = $2, updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'success'
            "#,
        )
        .bind(transaction_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, record: RecordTransaction) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions
                (transaction_id, user_id, amount, currency, status, gateway, metadata,
                 error_message)
            VALUES ($1, $2, $3, $4, 'failed', $5, $6, $7)
            ON CONFLICT (transaction_id) DO UPDATE
            SET status = 'failed', error_message = EXCLUDED.error_message,
                metadata = EXCLUDED.metadata, updated_at = NOW()
            WHERE payment_transactions.status <> 'success'
            "#,
        )
        .bind(&record.transaction_id)
        .bind(&record.user_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.gateway)
        .bind(&record.metadata)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
