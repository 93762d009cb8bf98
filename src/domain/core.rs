//! Backend-agnostic multi-queue orchestrator.
//!
//! Every cross-backend invariant — uuid uniqueness, ordering-key
//! assignment, poll = peek + remove, retain, owners map — lives here and
//! nowhere else. Backends only implement the narrow storage contract in
//! [`super::queue::QueueBackend`]; this type is the only caller of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::AppError;
use crate::metrics::{ASSIGNMENTS_TOTAL, DUPLICATE_REJECTED_TOTAL, MESSAGES_ADDED_TOTAL, POLLS_TOTAL};

use super::message::{MessageFilter, MessageRecord};
use super::queue::{AssignOutcome, OrdinalityPolicy, QueueBackend, ReleaseOutcome};

/// Bounded attempts to allocate a core-assigned ordering key before
/// surfacing `Backend(conflict)`.
const MAX_ID_ALLOCATION_RETRIES: u32 = 8;

pub struct MultiQueue {
    backend: Arc<dyn QueueBackend>,
}

impl MultiQueue {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Add `msg`, rejecting a uuid collision anywhere in the service.
    pub async fn add(&self, mut msg: MessageRecord) -> Result<MessageRecord, AppError> {
        if let Some(existing_sub_queue) = self.backend.find_sub_queue_of(&msg.uuid).await? {
            DUPLICATE_REJECTED_TOTAL.inc();
            return Err(AppError::DuplicateMessage(existing_sub_queue));
        }

        let stored = match self.backend.ordinality_policy() {
            OrdinalityPolicy::Intrinsic => self.backend.append(msg).await?,
            OrdinalityPolicy::CoreAssigned => {
                let mut attempt = 0;
                loop {
                    let next_id = self.backend.max_id_of(&msg.sub_queue).await?.unwrap_or(0) + 1;
                    msg.id = Some(next_id);
                    match self.backend.append(msg.clone()).await {
                        Ok(stored) => break stored,
                        Err(super::queue::QueueBackendError::Conflict(_))
                            if attempt < MAX_ID_ALLOCATION_RETRIES =>
                        {
                            attempt += 1;
                            let jitter_ms = rand::thread_rng().gen_range(1..=10);
                            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        };

        MESSAGES_ADDED_TOTAL.with_label_values(&[&stored.sub_queue]).inc();
        Ok(stored)
    }

    pub async fn remove(&self, uuid: &str) -> Result<bool, AppError> {
        Ok(self.backend.remove_by_uuid(uuid).await? > 0)
    }

    /// Head of `sub_queue` by ascending `id`, removed atomically at the
    /// backend's `remove_by_uuid` linearization point.
    pub async fn poll(&self, sub_queue: &str) -> Result<Option<MessageRecord>, AppError> {
        let Some(head) = self.peek(sub_queue).await? else {
            return Ok(None);
        };
        if self.backend.remove_by_uuid(&head.uuid).await? > 0 {
            POLLS_TOTAL.with_label_values(&[sub_queue]).inc();
            Ok(Some(head))
        } else {
            // Lost the race to a concurrent poll. Return empty rather than
            // retry — the caller's next poll will see the new head.
            Ok(None)
        }
    }

    pub async fn peek(&self, sub_queue: &str) -> Result<Option<MessageRecord>, AppError> {
        let mut records = self
            .backend
            .iterate_sub_queue(sub_queue, &MessageFilter::All)
            .await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    pub async fn get_message_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, AppError> {
        Ok(self.backend.find_by_uuid(uuid).await?)
    }

    pub async fn contains_uuid(&self, uuid: &str) -> Result<Option<String>, AppError> {
        Ok(self.backend.find_sub_queue_of(uuid).await?)
    }

    pub async fn get_for_sub_queue(
        &self,
        sub_queue: &str,
        filter: MessageFilter,
    ) -> Result<Vec<MessageRecord>, AppError> {
        Ok(self.backend.iterate_sub_queue(sub_queue, &filter).await?)
    }

    /// Sub-queue identifiers, restricted to non-empty ones when
    /// `include_empty` is `false`.
    pub async fn keys(&self, include_empty: bool) -> Result<HashSet<String>, AppError> {
        let all = self.backend.distinct_sub_queues().await?;
        if include_empty {
            return Ok(all.into_iter().collect());
        }
        let mut out = HashSet::new();
        for sub_queue in all {
            if self.backend.size_of(&sub_queue).await? > 0 {
                out.insert(sub_queue);
            }
        }
        Ok(out)
    }

    pub async fn size_of(&self, sub_queue: &str) -> Result<usize, AppError> {
        Ok(self.backend.size_of(sub_queue).await?)
    }

    pub async fn size(&self) -> Result<usize, AppError> {
        let mut total = 0;
        for sub_queue in self.backend.distinct_sub_queues().await? {
            total += self.backend.size_of(&sub_queue).await?;
        }
        Ok(total)
    }

    pub async fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.size().await? == 0)
    }

    pub async fn is_empty_for(&self, sub_queue: &str) -> Result<bool, AppError> {
        Ok(self.size_of(sub_queue).await? == 0)
    }

    pub async fn clear_for(&self, sub_queue: &str) -> Result<usize, AppError> {
        Ok(self.backend.delete_sub_queue(sub_queue).await?)
    }

    pub async fn clear_all(&self) -> Result<usize, AppError> {
        Ok(self.backend.delete_all().await?)
    }

    /// Idempotent assignment: succeeds if currently unassigned or already
    /// held by `owner`.
    pub async fn assign(&self, uuid: &str, owner: &str) -> Result<MessageRecord, AppError> {
        match self.backend.try_assign(uuid, owner).await? {
            AssignOutcome::Assigned(record) => {
                ASSIGNMENTS_TOTAL.with_label_values(&["assigned"]).inc();
                Ok(record)
            }
            AssignOutcome::AlreadyAssignedTo(other) => {
                ASSIGNMENTS_TOTAL.with_label_values(&["conflict"]).inc();
                Err(AppError::AlreadyAssigned(other))
            }
            AssignOutcome::NotFound => {
                ASSIGNMENTS_TOTAL.with_label_values(&["not_found"]).inc();
                Err(AppError::NotFound)
            }
        }
    }

    pub async fn release(&self, uuid: &str, owner: &str) -> Result<MessageRecord, AppError> {
        match self.backend.try_release(uuid, owner).await? {
            ReleaseOutcome::Released(record) => Ok(record),
            ReleaseOutcome::Mismatch => Err(AppError::AssignmentMismatch),
            ReleaseOutcome::NotFound => Err(AppError::NotFound),
        }
    }

    /// Replace the mutable metadata of the record with this uuid,
    /// preserving `id` and `sub_queue`.
    pub async fn persist(&self, msg: MessageRecord) -> Result<MessageRecord, AppError> {
        if self.backend.update_by_uuid(&msg.uuid, msg.clone()).await? {
            self.backend
                .find_by_uuid(&msg.uuid)
                .await?
                .ok_or_else(|| AppError::UpdateFailed(msg.uuid.clone()))
        } else {
            Err(AppError::NotFound)
        }
    }

    /// For each key in `keys(false)`, remove every record whose uuid is
    /// not in `keep`. Returns whether any removal occurred.
    pub async fn retain_all(&self, keep: &HashSet<String>) -> Result<bool, AppError> {
        let mut removed_any = false;
        for sub_queue in self.keys(false).await? {
            let records = self
                .backend
                .iterate_sub_queue(&sub_queue, &MessageFilter::All)
                .await?;
            for record in records {
                if !keep.contains(&record.uuid) {
                    let removed = self.backend.remove_by_uuid(&record.uuid).await?;
                    removed_any = removed_any || removed > 0;
                }
            }
        }
        Ok(removed_any)
    }

    /// owner -> set of sub-queues they currently hold ≥1 assigned message
    /// in, optionally restricted to one sub-queue.
    pub async fn owners_map(
        &self,
        sub_queue: Option<&str>,
    ) -> Result<HashMap<String, HashSet<String>>, AppError> {
        let sub_queues = match sub_queue {
            Some(sq) => vec![sq.to_string()],
            None => self.backend.distinct_sub_queues().await?,
        };

        let mut owners: HashMap<String, HashSet<String>> = HashMap::new();
        for sq in sub_queues {
            let assigned = self
                .backend
                .iterate_sub_queue(&sq, &MessageFilter::Assigned)
                .await?;
            for record in assigned {
                if let Some(owner) = record.assigned_to {
                    owners.entry(owner).or_default().insert(sq.clone());
                }
            }
        }
        Ok(owners)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        match self.backend.ping().await {
            Ok(()) => {
                crate::metrics::BACKEND_UP.set(1);
                Ok(())
            }
            Err(e) => {
                crate::metrics::BACKEND_UP.set(0);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Payload;
    use crate::domain::queue::MemoryBackend;
    use serde_json::json;

    fn queue() -> MultiQueue {
        MultiQueue::new(Arc::new(MemoryBackend::new()))
    }

    fn msg(uuid: &str, sub_queue: &str) -> MessageRecord {
        MessageRecord::new(
            Some(uuid.to_string()),
            sub_queue,
            Payload::new("application/json", json!({"k": "v"})),
        )
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids_within_a_sub_queue() {
        let q = queue();
        let a = q.add(msg("a", "orders")).await.unwrap();
        let b = q.add(msg("b", "orders")).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
    }

    #[tokio::test]
    async fn add_rejects_duplicate_uuid_across_sub_queues() {
        let q = queue();
        q.add(msg("a", "orders")).await.unwrap();
        let err = q.add(msg("a", "shipping")).await.unwrap_err();
        match err {
            AppError::DuplicateMessage(existing) => assert_eq!(existing, "orders"),
            other => panic!("expected DuplicateMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_removes_head_and_peek_does_not() {
        let q = queue();
        q.add(msg("a", "orders")).await.unwrap();
        q.add(msg("b", "orders")).await.unwrap();

        let peeked = q.peek("orders").await.unwrap().unwrap();
        assert_eq!(peeked.uuid, "a");
        assert_eq!(q.size_of("orders").await.unwrap(), 2);

        let polled = q.poll("orders").await.unwrap().unwrap();
        assert_eq!(polled.uuid, "a");
        assert_eq!(q.size_of("orders").await.unwrap(), 1);
        assert!(q.get_message_by_uuid("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_on_empty_sub_queue_returns_none() {
        let q = queue();
        assert!(q.poll("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn assign_is_idempotent_and_rejects_other_owner() {
        let q = queue();
        q.add(msg("a", "jobs")).await.unwrap();

        let first = q.assign("a", "worker-1").await.unwrap();
        assert_eq!(first.assigned_to, Some("worker-1".to_string()));
        let again = q.assign("a", "worker-1").await.unwrap();
        assert_eq!(again.assignment_timestamp, first.assignment_timestamp);

        let err = q.assign("a", "worker-2").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyAssigned(owner) if owner == "worker-1"));
    }

    #[tokio::test]
    async fn release_requires_matching_owner() {
        let q = queue();
        q.add(msg("a", "jobs")).await.unwrap();
        q.assign("a", "worker-1").await.unwrap();

        let err = q.release("a", "worker-2").await.unwrap_err();
        assert!(matches!(err, AppError::AssignmentMismatch));

        let released = q.release("a", "worker-1").await.unwrap();
        assert!(released.assigned_to.is_none());
    }

    #[tokio::test]
    async fn retain_all_keeps_only_the_given_uuids() {
        let q = queue();
        for (uuid, sub_queue) in [("m1", "a"), ("m2", "a"), ("m3", "b"), ("m4", "b"), ("m5", "a")] {
            q.add(msg(uuid, sub_queue)).await.unwrap();
        }

        let keep: HashSet<String> = ["m2", "m4"].iter().map(|s| s.to_string()).collect();
        let changed = q.retain_all(&keep).await.unwrap();
        assert!(changed);
        assert_eq!(q.size().await.unwrap(), 2);
        assert!(q.get_message_by_uuid("m2").await.unwrap().is_some());
        assert!(q.get_message_by_uuid("m4").await.unwrap().is_some());
        assert!(q.get_message_by_uuid("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_excludes_empty_sub_queues_when_requested() {
        let q = queue();
        q.add(msg("a", "orders")).await.unwrap();
        q.clear_for("orders").await.unwrap();
        q.add(msg("b", "jobs")).await.unwrap();

        let non_empty = q.keys(false).await.unwrap();
        assert_eq!(non_empty, ["jobs".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn owners_map_groups_sub_queues_by_owner() {
        let q = queue();
        q.add(msg("a", "orders")).await.unwrap();
        q.add(msg("b", "jobs")).await.unwrap();
        q.assign("a", "worker-1").await.unwrap();
        q.assign("b", "worker-1").await.unwrap();

        let owners = q.owners_map(None).await.unwrap();
        let held = owners.get("worker-1").unwrap();
        assert!(held.contains("orders"));
        assert!(held.contains("jobs"));
    }
}
