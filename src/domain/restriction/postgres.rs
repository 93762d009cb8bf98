//! Relational restriction registry.
//!
//! ```sql
//! CREATE TABLE restrictions (sub_queue TEXT PRIMARY KEY);
//! ```

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::queue::QueueBackendError;

use super::RestrictionBackend;

pub struct PostgresRestrictionBackend {
    pool: PgPool,
}

impl PostgresRestrictionBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestrictionBackend for PostgresRestrictionBackend {
    async fn is_restricted(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT sub_queue FROM restrictions WHERE sub_queue = $1")
                .bind(sub_queue)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn add(&self, sub_queue: &str) -> Result<(), QueueBackendError> {
        sqlx::query(
            "INSERT INTO restrictions (sub_queue) VALUES ($1) ON CONFLICT (sub_queue) DO NOTHING",
        )
        .bind(sub_queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let result = sqlx::query("DELETE FROM restrictions WHERE sub_queue = $1")
            .bind(sub_queue)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<String>, QueueBackendError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT sub_queue FROM restrictions")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(sq,)| sq).collect())
    }

    async fn clear(&self) -> Result<usize, QueueBackendError> {
        let result = sqlx::query("DELETE FROM restrictions").execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    fn reserved_sub_queues(&self) -> Vec<String> {
        Vec::new()
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
