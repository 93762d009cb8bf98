//! Relational queue backend (PostgreSQL).
//!
//! One table, `messages`, keyed by an auto-increment `id`. A `UNIQUE`
//! constraint on `uuid` enforces global uniqueness at the database layer
//! as a second line of defense behind the core's own check. Conditional
//! `UPDATE ... RETURNING` statements provide atomic assign/release
//! transitions without a client-side transaction.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE messages (
//!     id BIGSERIAL PRIMARY KEY,
//!     uuid TEXT UNIQUE NOT NULL,
//!     sub_queue TEXT NOT NULL,
//!     content_type TEXT NOT NULL,
//!     data JSONB NOT NULL,
//!     assigned_to TEXT,
//!     assignment_timestamp TIMESTAMPTZ
//! );
//! CREATE INDEX ON messages (sub_queue, id);
//! CREATE INDEX ON messages (assigned_to);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::message::{MessageFilter, MessageRecord, Payload};

use super::{AssignOutcome, OrdinalityPolicy, QueueBackend, QueueBackendError, ReleaseOutcome};

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn filter_clause(filter: &MessageFilter) -> &'static str {
        match filter {
            MessageFilter::All => "",
            MessageFilter::Assigned => " AND assigned_to IS NOT NULL",
            MessageFilter::Unassigned => " AND assigned_to IS NULL",
            MessageFilter::AssignedTo(_) => " AND assigned_to = $2",
        }
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    id: i64,
    uuid: String,
    sub_queue: String,
    content_type: String,
    data: serde_json::Value,
    assigned_to: Option<String>,
    assignment_timestamp: Option<DateTime<Utc>>,
}

impl From<Row> for MessageRecord {
    fn from(row: Row) -> Self {
        MessageRecord {
            uuid: row.uuid,
            sub_queue: row.sub_queue,
            payload: Payload::new(row.content_type, row.data),
            id: Some(row.id),
            assigned_to: row.assigned_to,
            assignment_timestamp: row.assignment_timestamp,
        }
    }
}

#[async_trait]
impl QueueBackend for PostgresBackend {
    fn ordinality_policy(&self) -> OrdinalityPolicy {
        OrdinalityPolicy::Intrinsic
    }

    async fn append(&self, record: MessageRecord) -> Result<MessageRecord, QueueBackendError> {
        let row: Row = sqlx::query_as(
            r#"
            INSERT INTO messages (uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp
            "#,
        )
        .bind(&record.uuid)
        .bind(&record.sub_queue)
        .bind(&record.payload.content_type)
        .bind(&record.payload.data)
        .bind(&record.assigned_to)
        .bind(record.assignment_timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn remove_by_uuid(&self, uuid: &str) -> Result<usize, QueueBackendError> {
        let result = sqlx::query("DELETE FROM messages WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn update_by_uuid(
        &self,
        uuid: &str,
        record: MessageRecord,
    ) -> Result<bool, QueueBackendError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content_type = $2, data = $3, assigned_to = $4, assignment_timestamp = $5
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(&record.payload.content_type)
        .bind(&record.payload.data)
        .bind(&record.assigned_to)
        .bind(record.assignment_timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, QueueBackendError> {
        let row: Option<Row> = sqlx::query_as(
            "SELECT id, uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp FROM messages WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_sub_queue_of(&self, uuid: &str) -> Result<Option<String>, QueueBackendError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT sub_queue FROM messages WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(sq,)| sq))
    }

    async fn iterate_sub_queue(
        &self,
        sub_queue: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, QueueBackendError> {
        let base = format!(
            "SELECT id, uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp \
             FROM messages WHERE sub_queue = $1{} ORDER BY id ASC",
            Self::filter_clause(filter)
        );

        let rows: Vec<Row> = if let MessageFilter::AssignedTo(owner) = filter {
            sqlx::query_as(&base)
                .bind(sub_queue)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as(&base)
                .bind(sub_queue)
                .fetch_all(&self.pool)
                .await?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn max_id_of(&self, _sub_queue: &str) -> Result<Option<i64>, QueueBackendError> {
        // Intrinsic ordinality: the core never needs this for Postgres.
        Ok(None)
    }

    async fn size_of(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE sub_queue = $1")
                .bind(sub_queue)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn distinct_sub_queues(&self) -> Result<Vec<String>, QueueBackendError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT sub_queue FROM messages")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(sq,)| sq).collect())
    }

    async fn delete_sub_queue(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let result = sqlx::query("DELETE FROM messages WHERE sub_queue = $1")
            .bind(sub_queue)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_all(&self) -> Result<usize, QueueBackendError> {
        let result = sqlx::query("DELETE FROM messages").execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn try_assign(&self, uuid: &str, owner: &str) -> Result<AssignOutcome, QueueBackendError> {
        let row: Option<Row> = sqlx::query_as(
            r#"
            UPDATE messages
            SET assigned_to = $2, assignment_timestamp = COALESCE(assignment_timestamp, NOW())
            WHERE uuid = $1 AND (assigned_to IS NULL OR assigned_to = $2)
            RETURNING id, uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp
            "#,
        )
        .bind(uuid)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(AssignOutcome::Assigned(row.into()));
        }

        match self.find_by_uuid(uuid).await? {
            Some(existing) => Ok(AssignOutcome::AlreadyAssignedTo(
                existing.assigned_to.unwrap_or_default(),
            )),
            None => Ok(AssignOutcome::NotFound),
        }
    }

    async fn try_release(&self, uuid: &str, owner: &str) -> Result<ReleaseOutcome, QueueBackendError> {
        let row: Option<Row> = sqlx::query_as(
            r#"
            UPDATE messages
            SET assigned_to = NULL, assignment_timestamp = NULL
            WHERE uuid = $1 AND assigned_to = $2
            RETURNING id, uuid, sub_queue, content_type, data, assigned_to, assignment_timestamp
            "#,
        )
        .bind(uuid)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ReleaseOutcome::Released(row.into()));
        }

        match self.find_by_uuid(uuid).await? {
            Some(_) => Ok(ReleaseOutcome::Mismatch),
            None => Ok(ReleaseOutcome::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
