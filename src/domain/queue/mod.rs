//! Storage abstraction for sub-queue messages.
//!
//! Four interchangeable backends implement [`QueueBackend`]: an in-memory
//! map, a relational store, a key/value cache, and a document store. The
//! [`crate::domain::core`] orchestrator is the only place that knows about
//! uniqueness, ordering, and assignment semantics — backends only do
//! storage.

mod document;
pub mod factory;
mod memory;
mod postgres;
mod redis;

pub use document::DocumentBackend;
pub use factory::{create_queue_backend, BackendConnections};
pub use memory::{InMemorySet, MemoryBackend};
pub use postgres::PostgresBackend;
pub use redis::RedisBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::message::{MessageFilter, MessageRecord};

/// Whether a backend assigns the ordering key itself (e.g. a database
/// auto-increment sequence) or expects the core to compute
/// `max(id) + 1` before calling [`QueueBackend::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalityPolicy {
    Intrinsic,
    CoreAssigned,
}

/// Storage-layer failure kinds. The core never surfaces these directly —
/// it wraps them in [`crate::error::AppError::Backend`].
#[derive(Debug, Error)]
pub enum QueueBackendError {
    #[error("backend operation timed out")]
    Timeout,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend conflict: {0}")]
    Conflict(String),
    #[error("backend io error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for QueueBackendError {
    fn from(err: sqlx::Error) -> Self {
        QueueBackendError::Io(err.to_string())
    }
}

impl From<::redis::RedisError> for QueueBackendError {
    fn from(err: ::redis::RedisError) -> Self {
        QueueBackendError::Io(err.to_string())
    }
}

impl From<mongodb::error::Error> for QueueBackendError {
    fn from(err: mongodb::error::Error) -> Self {
        QueueBackendError::Io(err.to_string())
    }
}

/// Narrow storage contract every queue backend must implement.
///
/// Higher-level semantics (uniqueness, poll = peek + remove, retain,
/// owners map) live in [`crate::domain::core::MultiQueue`], never here.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn ordinality_policy(&self) -> OrdinalityPolicy;

    /// Store `record`; intrinsic backends fill in `id` on the returned copy.
    async fn append(&self, record: MessageRecord) -> Result<MessageRecord, QueueBackendError>;

    /// Remove the record with this uuid wherever it lives. Returns the
    /// number of records removed (0 or 1).
    async fn remove_by_uuid(&self, uuid: &str) -> Result<usize, QueueBackendError>;

    /// Replace the mutable metadata (assignment, payload) of the record
    /// with this uuid, preserving its `id` and `sub_queue`. Returns
    /// `false` if no record with that uuid exists.
    async fn update_by_uuid(
        &self,
        uuid: &str,
        record: MessageRecord,
    ) -> Result<bool, QueueBackendError>;

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, QueueBackendError>;

    /// The sub-queue a uuid currently belongs to, if any.
    async fn find_sub_queue_of(&self, uuid: &str) -> Result<Option<String>, QueueBackendError>;

    /// Records of one sub-queue matching `filter`, ascending by `id`.
    async fn iterate_sub_queue(
        &self,
        sub_queue: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, QueueBackendError>;

    /// The current maximum `id` in `sub_queue`. Only meaningful (and only
    /// called) for [`OrdinalityPolicy::CoreAssigned`] backends.
    async fn max_id_of(&self, sub_queue: &str) -> Result<Option<i64>, QueueBackendError>;

    async fn size_of(&self, sub_queue: &str) -> Result<usize, QueueBackendError>;

    async fn distinct_sub_queues(&self) -> Result<Vec<String>, QueueBackendError>;

    /// Remove every record in `sub_queue`. Returns the count removed.
    async fn delete_sub_queue(&self, sub_queue: &str) -> Result<usize, QueueBackendError>;

    /// Remove every record in every sub-queue. Returns the count removed.
    async fn delete_all(&self) -> Result<usize, QueueBackendError>;

    /// Atomically assign `uuid` to `owner`: succeeds if currently
    /// unassigned or already assigned to `owner` (idempotent). Implemented
    /// as a conditional update per backend (`UPDATE ... WHERE assigned_to
    /// IS NULL OR assigned_to = $owner` for Postgres,
    /// `find_one_and_update` with the same filter for Mongo, a
    /// compare-and-swap loop for Redis, a lock-guarded check for memory)
    /// so concurrent assigners never both "win".
    async fn try_assign(&self, uuid: &str, owner: &str) -> Result<AssignOutcome, QueueBackendError>;

    /// Atomically clear the assignment on `uuid`, but only if it is
    /// currently assigned to `owner`.
    async fn try_release(&self, uuid: &str, owner: &str) -> Result<ReleaseOutcome, QueueBackendError>;

    async fn ping(&self) -> Result<(), QueueBackendError>;
}

/// Result of a conditional assignment attempt.
#[derive(Debug)]
pub enum AssignOutcome {
    /// Newly assigned, or already assigned to the same owner (idempotent).
    Assigned(MessageRecord),
    /// Assigned to a different owner.
    AlreadyAssignedTo(String),
    NotFound,
}

/// Result of a conditional release attempt.
#[derive(Debug)]
pub enum ReleaseOutcome {
    Released(MessageRecord),
    /// Not currently assigned to the caller (either unassigned or held by
    /// someone else).
    Mismatch,
    NotFound,
}
