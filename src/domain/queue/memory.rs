//! In-memory queue backend using `DashMap`.
//!
//! Per-sub-queue storage with an explicit ordering key rather than pure
//! FIFO, plus a process-wide uuid index for O(1) uniqueness checks.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::domain::message::{MessageFilter, MessageRecord};

use chrono::Utc;

use super::{AssignOutcome, OrdinalityPolicy, QueueBackend, QueueBackendError, ReleaseOutcome};

/// In-memory backend. Ordinality is core-assigned: the core computes the
/// next `id` via [`QueueBackend::max_id_of`] before calling
/// [`QueueBackend::append`].
pub struct MemoryBackend {
    sub_queues: DashMap<String, RwLock<Vec<MessageRecord>>>,
    /// uuid -> sub_queue, kept in lock-step with `sub_queues` for O(1)
    /// uniqueness/lookup without scanning every sub-queue.
    uuid_index: DashMap<String, String>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            sub_queues: DashMap::new(),
            uuid_index: DashMap::new(),
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn ordinality_policy(&self) -> OrdinalityPolicy {
        OrdinalityPolicy::CoreAssigned
    }

    async fn append(&self, record: MessageRecord) -> Result<MessageRecord, QueueBackendError> {
        let lock = self
            .sub_queues
            .entry(record.sub_queue.clone())
            .or_insert_with(|| RwLock::new(Vec::new()));
        let mut records = lock.write().await;
        records.push(record.clone());
        self.uuid_index
            .insert(record.uuid.clone(), record.sub_queue.clone());
        Ok(record)
    }

    async fn remove_by_uuid(&self, uuid: &str) -> Result<usize, QueueBackendError> {
        let Some((_, sub_queue)) = self.uuid_index.remove(uuid) else {
            return Ok(0);
        };
        let Some(lock) = self.sub_queues.get(&sub_queue) else {
            return Ok(0);
        };
        let mut records = lock.write().await;
        let before = records.len();
        records.retain(|r| r.uuid != uuid);
        Ok(before - records.len())
    }

    async fn update_by_uuid(
        &self,
        uuid: &str,
        record: MessageRecord,
    ) -> Result<bool, QueueBackendError> {
        let Some(sub_queue) = self.uuid_index.get(uuid).map(|v| v.clone()) else {
            return Ok(false);
        };
        let Some(lock) = self.sub_queues.get(&sub_queue) else {
            return Ok(false);
        };
        let mut records = lock.write().await;
        for existing in records.iter_mut() {
            if existing.uuid == uuid {
                let id = existing.id;
                let sub_queue = existing.sub_queue.clone();
                *existing = record;
                existing.id = id;
                existing.sub_queue = sub_queue;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, QueueBackendError> {
        let Some(sub_queue) = self.uuid_index.get(uuid).map(|v| v.clone()) else {
            return Ok(None);
        };
        let Some(lock) = self.sub_queues.get(&sub_queue) else {
            return Ok(None);
        };
        let records = lock.read().await;
        Ok(records.iter().find(|r| r.uuid == uuid).cloned())
    }

    async fn find_sub_queue_of(&self, uuid: &str) -> Result<Option<String>, QueueBackendError> {
        Ok(self.uuid_index.get(uuid).map(|v| v.clone()))
    }

    async fn iterate_sub_queue(
        &self,
        sub_queue: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, QueueBackendError> {
        let Some(lock) = self.sub_queues.get(sub_queue) else {
            return Ok(Vec::new());
        };
        let records = lock.read().await;
        let mut matching: Vec<MessageRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.id.unwrap_or(i64::MAX));
        Ok(matching)
    }

    async fn max_id_of(&self, sub_queue: &str) -> Result<Option<i64>, QueueBackendError> {
        let Some(lock) = self.sub_queues.get(sub_queue) else {
            return Ok(None);
        };
        let records = lock.read().await;
        Ok(records.iter().filter_map(|r| r.id).max())
    }

    async fn size_of(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let Some(lock) = self.sub_queues.get(sub_queue) else {
            return Ok(0);
        };
        Ok(lock.read().await.len())
    }

    async fn distinct_sub_queues(&self) -> Result<Vec<String>, QueueBackendError> {
        Ok(self.sub_queues.iter().map(|e| e.key().clone()).collect())
    }

    async fn delete_sub_queue(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let Some((_, lock)) = self.sub_queues.remove(sub_queue) else {
            return Ok(0);
        };
        let records = lock.into_inner();
        for r in &records {
            self.uuid_index.remove(&r.uuid);
        }
        Ok(records.len())
    }

    async fn delete_all(&self) -> Result<usize, QueueBackendError> {
        let mut total = 0;
        let keys: Vec<String> = self.sub_queues.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            total += self.delete_sub_queue(&key).await?;
        }
        Ok(total)
    }

    async fn try_assign(&self, uuid: &str, owner: &str) -> Result<AssignOutcome, QueueBackendError> {
        let Some(sub_queue) = self.uuid_index.get(uuid).map(|v| v.clone()) else {
            return Ok(AssignOutcome::NotFound);
        };
        let Some(lock) = self.sub_queues.get(&sub_queue) else {
            return Ok(AssignOutcome::NotFound);
        };
        let mut records = lock.write().await;
        let Some(existing) = records.iter_mut().find(|r| r.uuid == uuid) else {
            return Ok(AssignOutcome::NotFound);
        };
        match &existing.assigned_to {
            Some(current) if current != owner => Ok(AssignOutcome::AlreadyAssignedTo(current.clone())),
            Some(_) => Ok(AssignOutcome::Assigned(existing.clone())),
            None => {
                existing.assigned_to = Some(owner.to_string());
                existing.assignment_timestamp = Some(Utc::now());
                Ok(AssignOutcome::Assigned(existing.clone()))
            }
        }
    }

    async fn try_release(&self, uuid: &str, owner: &str) -> Result<ReleaseOutcome, QueueBackendError> {
        let Some(sub_queue) = self.uuid_index.get(uuid).map(|v| v.clone()) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let Some(lock) = self.sub_queues.get(&sub_queue) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let mut records = lock.write().await;
        let Some(existing) = records.iter_mut().find(|r| r.uuid == uuid) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        match &existing.assigned_to {
            Some(current) if current == owner => {
                existing.assigned_to = None;
                Ok(ReleaseOutcome::Released(existing.clone()))
            }
            _ => Ok(ReleaseOutcome::Mismatch),
        }
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        Ok(())
    }
}

/// Generic in-memory "named set" store, reused by [`super::super::restriction::MemoryRestrictionBackend`]
/// and by the cache backend's own restriction-set bookkeeping.
#[derive(Default)]
pub struct InMemorySet {
    inner: RwLock<HashMap<String, ()>>,
}

impl InMemorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: String) {
        self.inner.write().await.insert(key, ());
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    pub async fn list(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn clear(&self) -> usize {
        let mut guard = self.inner.write().await;
        let count = guard.len();
        guard.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(uuid: &str, sub_queue: &str) -> MessageRecord {
        MessageRecord::new(
            Some(uuid.to_string()),
            sub_queue,
            crate::domain::message::Payload::new("application/json", json!({})),
        )
    }

    #[tokio::test]
    async fn append_and_find_by_uuid() {
        let backend = MemoryBackend::new();
        let mut r = record("a", "orders");
        r.id = Some(1);
        backend.append(r.clone()).await.unwrap();

        let found = backend.find_by_uuid("a").await.unwrap().unwrap();
        assert_eq!(found.uuid, "a");
        assert_eq!(backend.find_sub_queue_of("a").await.unwrap(), Some("orders".to_string()));
    }

    #[tokio::test]
    async fn remove_by_uuid_deletes_and_is_idempotent() {
        let backend = MemoryBackend::new();
        let mut r = record("a", "orders");
        r.id = Some(1);
        backend.append(r).await.unwrap();

        assert_eq!(backend.remove_by_uuid("a").await.unwrap(), 1);
        assert_eq!(backend.remove_by_uuid("a").await.unwrap(), 0);
        assert!(backend.find_by_uuid("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn iterate_sub_queue_orders_by_id() {
        let backend = MemoryBackend::new();
        for (uuid, id) in [("c", 3), ("a", 1), ("b", 2)] {
            let mut r = record(uuid, "orders");
            r.id = Some(id);
            backend.append(r).await.unwrap();
        }

        let all = backend
            .iterate_sub_queue("orders", &MessageFilter::All)
            .await
            .unwrap();
        let uuids: Vec<&str> = all.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn max_id_of_and_delete_sub_queue() {
        let backend = MemoryBackend::new();
        for (uuid, id) in [("a", 1), ("b", 5)] {
            let mut r = record(uuid, "orders");
            r.id = Some(id);
            backend.append(r).await.unwrap();
        }

        assert_eq!(backend.max_id_of("orders").await.unwrap(), Some(5));
        assert_eq!(backend.delete_sub_queue("orders").await.unwrap(), 2);
        assert_eq!(backend.size_of("orders").await.unwrap(), 0);
        assert!(backend.find_by_uuid("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_by_uuid_preserves_id_and_sub_queue() {
        let backend = MemoryBackend::new();
        let mut r = record("a", "orders");
        r.id = Some(1);
        backend.append(r.clone()).await.unwrap();

        let mut updated = r.clone();
        updated.assigned_to = Some("worker-1".to_string());
        updated.id = Some(999); // must be ignored
        updated.sub_queue = "other".to_string(); // must be ignored

        assert!(backend.update_by_uuid("a", updated).await.unwrap());
        let stored = backend.find_by_uuid("a").await.unwrap().unwrap();
        assert_eq!(stored.id, Some(1));
        assert_eq!(stored.sub_queue, "orders");
        assert_eq!(stored.assigned_to, Some("worker-1".to_string()));
    }

    #[tokio::test]
    async fn try_assign_is_idempotent_and_rejects_other_owner() {
        let backend = MemoryBackend::new();
        let mut r = record("a", "jobs");
        r.id = Some(1);
        backend.append(r).await.unwrap();

        assert!(matches!(
            backend.try_assign("a", "worker-1").await.unwrap(),
            AssignOutcome::Assigned(_)
        ));
        assert!(matches!(
            backend.try_assign("a", "worker-1").await.unwrap(),
            AssignOutcome::Assigned(_)
        ));
        match backend.try_assign("a", "worker-2").await.unwrap() {
            AssignOutcome::AlreadyAssignedTo(owner) => assert_eq!(owner, "worker-1"),
            other => panic!("expected AlreadyAssignedTo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn try_release_requires_matching_owner() {
        let backend = MemoryBackend::new();
        let mut r = record("b", "jobs");
        r.id = Some(1);
        backend.append(r).await.unwrap();
        backend.try_assign("b", "worker-1").await.unwrap();

        assert!(matches!(
            backend.try_release("b", "worker-2").await.unwrap(),
            ReleaseOutcome::Mismatch
        ));
        assert!(matches!(
            backend.try_release("b", "worker-1").await.unwrap(),
            ReleaseOutcome::Released(_)
        ));
        let stored = backend.find_by_uuid("b").await.unwrap().unwrap();
        assert!(stored.assigned_to.is_none());
    }
}
