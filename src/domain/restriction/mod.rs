//! Restriction registry: which sub-queues require a matching bearer token.
//!
//! Mirrors the storage-pluggability of [`crate::domain::queue`] (spec
//! §4.3: "the same four variants are supported") but the contract is
//! narrower — a restriction record is just a name, it never mutates, so
//! there is no ordering or assignment machinery to share with the message
//! backend.

mod document;
mod factory;
mod memory;
mod postgres;
mod redis;

pub use document::DocumentRestrictionBackend;
pub use factory::create_restriction_backend;
pub use memory::MemoryRestrictionBackend;
pub use postgres::PostgresRestrictionBackend;
pub use redis::RedisRestrictionBackend;

use async_trait::async_trait;

use super::queue::QueueBackendError;

/// Storage contract for the restriction registry.
#[async_trait]
pub trait RestrictionBackend: Send + Sync {
    async fn is_restricted(&self, sub_queue: &str) -> Result<bool, QueueBackendError>;
    async fn add(&self, sub_queue: &str) -> Result<(), QueueBackendError>;
    /// Returns whether a restriction existed and was removed.
    async fn remove(&self, sub_queue: &str) -> Result<bool, QueueBackendError>;
    async fn list(&self) -> Result<Vec<String>, QueueBackendError>;
    /// Returns the number of restrictions removed.
    async fn clear(&self) -> Result<usize, QueueBackendError>;
    /// Identifiers this backend's own storage uses internally; callers
    /// must never be allowed to create a real sub-queue or restriction
    /// with one of these names.
    fn reserved_sub_queues(&self) -> Vec<String>;
    async fn ping(&self) -> Result<(), QueueBackendError>;
}
