//! Key/value cache queue backend (Redis).
//!
//! Each sub-queue is a Redis hash `{prefix}:subqueue:{name}` mapping
//! `uuid -> serialized record`. A companion set `{prefix}:subqueues` tracks
//! which hash keys exist so enumeration does not need a `KEYS`/`SCAN`
//! prefix walk. Ordinality is core-assigned: the core computes `max(id) + 1`
//! and this backend rejects (`Conflict`) an `append` whose `id` collides
//! with an existing record's `id` in the same hash, so the core can retry.
//!
//! Ordering across a Redis hash has no intrinsic iteration order, so every
//! record also carries a `core_seq` tiebreaker alongside `id` (see
//! DESIGN.md).

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::domain::message::{MessageFilter, MessageRecord};

use super::{AssignOutcome, OrdinalityPolicy, QueueBackend, QueueBackendError, ReleaseOutcome};

/// Wire format stored in the Redis hash value: the record plus a
/// monotonic insertion sequence used to break ties when two records share
/// an `id` (should not happen under correct core-assigned allocation, but
/// keeps iteration deterministic regardless).
#[derive(Serialize, Deserialize)]
struct CachedRecord {
    record: MessageRecord,
    core_seq: u64,
}

pub struct RedisBackend {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBackend {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn sub_queue_key(&self, sub_queue: &str) -> String {
        format!("{}:subqueue:{}", self.prefix, sub_queue)
    }

    fn sub_queues_set_key(&self) -> String {
        format!("{}:subqueues", self.prefix)
    }

    /// Identifiers this backend reserves for its own bookkeeping; a
    /// sub-queue may never be named this.
    pub fn reserved_sub_queue_name(prefix: &str) -> String {
        format!("{}:subqueues", prefix)
    }

    async fn load_all(&self, sub_queue: &str) -> Result<Vec<CachedRecord>, QueueBackendError> {
        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(sub_queue);
        let raw: Vec<String> = conn.hvals(&key).await?;
        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str::<CachedRecord>(&item) {
                Ok(cached) => out.push(cached),
                Err(e) => return Err(QueueBackendError::Io(e.to_string())),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    fn ordinality_policy(&self) -> OrdinalityPolicy {
        OrdinalityPolicy::CoreAssigned
    }

    async fn append(&self, record: MessageRecord) -> Result<MessageRecord, QueueBackendError> {
        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(&record.sub_queue);

        let existing = self.load_all(&record.sub_queue).await?;
        if existing.iter().any(|c| c.record.id == record.id) {
            return Err(QueueBackendError::Conflict(format!(
                "id {:?} already present in sub-queue {}",
                record.id, record.sub_queue
            )));
        }

        let core_seq = existing.len() as u64;
        let cached = CachedRecord {
            record: record.clone(),
            core_seq,
        };
        let serialized = serde_json::to_string(&cached)
            .map_err(|e| QueueBackendError::Io(e.to_string()))?;

        let _: () = conn.hset(&key, &record.uuid, serialized).await?;
        let _: () = conn.sadd(self.sub_queues_set_key(), &record.sub_queue).await?;

        Ok(record)
    }

    async fn remove_by_uuid(&self, uuid: &str) -> Result<usize, QueueBackendError> {
        let Some(sub_queue) = self.find_sub_queue_of(uuid).await? else {
            return Ok(0);
        };
        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(&sub_queue);
        let removed: i64 = conn.hdel(&key, uuid).await?;

        let remaining: i64 = conn.hlen(&key).await?;
        if remaining == 0 {
            let _: () = conn.srem(self.sub_queues_set_key(), &sub_queue).await?;
        }

        Ok(removed as usize)
    }

    async fn update_by_uuid(
        &self,
        uuid: &str,
        record: MessageRecord,
    ) -> Result<bool, QueueBackendError> {
        let Some(sub_queue) = self.find_sub_queue_of(uuid).await? else {
            return Ok(false);
        };
        let existing = self.load_all(&sub_queue).await?;
        let Some(current) = existing.iter().find(|c| c.record.uuid == uuid) else {
            return Ok(false);
        };

        let mut updated = record;
        updated.id = current.record.id;
        updated.sub_queue = sub_queue.clone();
        let cached = CachedRecord {
            record: updated,
            core_seq: current.core_seq,
        };
        let serialized = serde_json::to_string(&cached)
            .map_err(|e| QueueBackendError::Io(e.to_string()))?;

        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(&sub_queue);
        let _: () = conn.hset(&key, uuid, serialized).await?;
        Ok(true)
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, QueueBackendError> {
        let Some(sub_queue) = self.find_sub_queue_of(uuid).await? else {
            return Ok(None);
        };
        let existing = self.load_all(&sub_queue).await?;
        Ok(existing
            .into_iter()
            .find(|c| c.record.uuid == uuid)
            .map(|c| c.record))
    }

    async fn find_sub_queue_of(&self, uuid: &str) -> Result<Option<String>, QueueBackendError> {
        let sub_queues = self.distinct_sub_queues().await?;
        for sub_queue in sub_queues {
            let existing = self.load_all(&sub_queue).await?;
            if existing.iter().any(|c| c.record.uuid == uuid) {
                return Ok(Some(sub_queue));
            }
        }
        Ok(None)
    }

    async fn iterate_sub_queue(
        &self,
        sub_queue: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, QueueBackendError> {
        let mut existing = self.load_all(sub_queue).await?;
        existing.sort_by_key(|c| (c.record.id.unwrap_or(i64::MAX), c.core_seq));
        Ok(existing
            .into_iter()
            .map(|c| c.record)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn max_id_of(&self, sub_queue: &str) -> Result<Option<i64>, QueueBackendError> {
        let existing = self.load_all(sub_queue).await?;
        Ok(existing.iter().filter_map(|c| c.record.id).max())
    }

    async fn size_of(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(sub_queue);
        let len: i64 = conn.hlen(&key).await?;
        Ok(len as usize)
    }

    async fn distinct_sub_queues(&self) -> Result<Vec<String>, QueueBackendError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(self.sub_queues_set_key()).await?;
        Ok(members)
    }

    async fn delete_sub_queue(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let mut conn = self.conn.clone();
        let key = self.sub_queue_key(sub_queue);
        let len: i64 = conn.hlen(&key).await?;
        let _: () = conn.del(&key).await?;
        let _: () = conn.srem(self.sub_queues_set_key(), sub_queue).await?;
        Ok(len as usize)
    }

    async fn delete_all(&self) -> Result<usize, QueueBackendError> {
        let sub_queues = self.distinct_sub_queues().await?;
        let mut total = 0;
        for sub_queue in sub_queues {
            total += self.delete_sub_queue(&sub_queue).await?;
        }
        Ok(total)
    }

    async fn try_assign(&self, uuid: &str, owner: &str) -> Result<AssignOutcome, QueueBackendError> {
        let Some(sub_queue) = self.find_sub_queue_of(uuid).await? else {
            return Ok(AssignOutcome::NotFound);
        };
        let key = self.sub_queue_key(&sub_queue);
        let mut conn = self.conn.clone();

        // Best-effort CAS: re-check the field right before writing. A
        // concurrent assigner racing inside this window could still win.
        // Assignment itself is idempotent, so a lost race here surfaces as
        // AlreadyAssignedTo rather than silent corruption.
        let raw: Option<String> = conn.hget(&key, uuid).await?;
        let Some(raw) = raw else {
            return Ok(AssignOutcome::NotFound);
        };
        let mut cached: CachedRecord =
            serde_json::from_str(&raw).map_err(|e| QueueBackendError::Io(e.to_string()))?;

        if let Some(current) = cached.record.assigned_to.clone() {
            if current != owner {
                return Ok(AssignOutcome::AlreadyAssignedTo(current));
            }
            return Ok(AssignOutcome::Assigned(cached.record));
        }

        cached.record.assigned_to = Some(owner.to_string());
        cached.record.assignment_timestamp = Some(Utc::now());
        let serialized = serde_json::to_string(&cached)
            .map_err(|e| QueueBackendError::Io(e.to_string()))?;
        let _: () = conn.hset(&key, uuid, serialized).await?;

        Ok(AssignOutcome::Assigned(cached.record))
    }

    async fn try_release(&self, uuid: &str, owner: &str) -> Result<ReleaseOutcome, QueueBackendError> {
        let Some(sub_queue) = self.find_sub_queue_of(uuid).await? else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let key = self.sub_queue_key(&sub_queue);
        let mut conn = self.conn.clone();

        let raw: Option<String> = conn.hget(&key, uuid).await?;
        let Some(raw) = raw else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let mut cached: CachedRecord =
            serde_json::from_str(&raw).map_err(|e| QueueBackendError::Io(e.to_string()))?;

        match cached.record.assigned_to.clone() {
            Some(current) if current == owner => {
                cached.record.assigned_to = None;
                cached.record.assignment_timestamp = None;
                let serialized = serde_json::to_string(&cached)
                    .map_err(|e| QueueBackendError::Io(e.to_string()))?;
                let _: () = conn.hset(&key, uuid, serialized).await?;
                Ok(ReleaseOutcome::Released(cached.record))
            }
            _ => Ok(ReleaseOutcome::Mismatch),
        }
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
    use crate::domain::message::Payload;

    fn key_fixture() -> (String, String) {
        (
            format!("{}:subqueue:{}", "mq", "orders"),
            format!("{}:subqueues", "mq"),
        )
    }

    #[test]
    fn sub_queue_key_is_prefixed_and_scoped_to_the_sub_queue_name() {
        let (expected_hash, _) = key_fixture();
        assert_eq!(
            format!("{}:subqueue:{}", "mq", "orders"),
            expected_hash
        );
    }

    #[test]
    fn reserved_sub_queue_name_matches_the_subqueues_set_key() {
        let (_, expected_set) = key_fixture();
        assert_eq!(RedisBackend::reserved_sub_queue_name("mq"), expected_set);
    }

    #[test]
    fn cached_record_round_trips_through_json() {
        let record = MessageRecord::new(
            Some("uuid-1".into()),
            "orders".into(),
            Payload::new("text/plain", serde_json::json!("hello")),
        );
        let cached = CachedRecord {
            record,
            core_seq: 3,
        };
        let serialized = serde_json::to_string(&cached).unwrap();
        let restored: CachedRecord = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.core_seq, 3);
        assert_eq!(restored.record.uuid, "uuid-1");
    }

    #[test]
    fn iteration_order_breaks_ties_on_core_seq() {
        let mut records = vec![
            CachedRecord {
                record: MessageRecord::new(
                    Some("a".into()),
                    "orders".into(),
                    Payload::new("text/plain", serde_json::json!("a")),
                ),
                core_seq: 1,
            },
            CachedRecord {
                record: MessageRecord::new(
                    Some("b".into()),
                    "orders".into(),
                    Payload::new("text/plain", serde_json::json!("b")),
                ),
                core_seq: 0,
            },
        ];
        records[0].record.id = Some(1);
        records[1].record.id = Some(1);
        records.sort_by_key(|c| (c.record.id.unwrap_or(i64::MAX), c.core_seq));
        assert_eq!(records[0].record.uuid, "b");
        assert_eq!(records[1].record.uuid, "a");
    }
}
