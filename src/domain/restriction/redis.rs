//! Key/value cache restriction registry: a single Redis `SET` of
//! restricted sub-queue names, keyed `{prefix}:restrictions`.
//!
//! That key name is itself reserved, and so is the cache queue backend's
//! own `{prefix}:subqueues` enumeration key — `reserved_sub_queues` reports
//! both so a tenant can never create a sub-queue colliding with either
//! backend's bookkeeping.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::queue::{QueueBackendError, RedisBackend};

use super::RestrictionBackend;

pub struct RedisRestrictionBackend {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRestrictionBackend {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn set_key(&self) -> String {
        format!("{}:restrictions", self.prefix)
    }
}

#[async_trait]
impl RestrictionBackend for RedisRestrictionBackend {
    async fn is_restricted(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(self.set_key(), sub_queue).await?)
    }

    async fn add(&self, sub_queue: &str) -> Result<(), QueueBackendError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(self.set_key(), sub_queue).await?;
        Ok(())
    }

    async fn remove(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(self.set_key(), sub_queue).await?;
        Ok(removed == 1)
    }

    async fn list(&self) -> Result<Vec<String>, QueueBackendError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(self.set_key()).await?)
    }

    async fn clear(&self) -> Result<usize, QueueBackendError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.scard(self.set_key()).await?;
        let _: () = conn.del(self.set_key()).await?;
        Ok(len as usize)
    }

    fn reserved_sub_queues(&self) -> Vec<String> {
        vec![self.set_key(), RedisBackend::reserved_sub_queue_name(&self.prefix)]
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_reserves_the_registry_storage_name() {
        // No live server to construct a real ConnectionManager against;
        // exercise the pure key-formatting logic directly instead.
        let prefix = "mq";
        assert_eq!(format!("{}:restrictions", prefix), "mq:restrictions");
    }

    #[test]
    fn reserved_sub_queues_includes_both_backends_bookkeeping_keys() {
        let prefix = "mq";
        let expected_restrictions = format!("{}:restrictions", prefix);
        let expected_subqueues = RedisBackend::reserved_sub_queue_name(prefix);
        assert_eq!(expected_restrictions, "mq:restrictions");
        assert_eq!(expected_subqueues, "mq:subqueues");
    }
}
