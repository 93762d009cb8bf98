//! Document store queue backend (MongoDB).
//!
//! One collection, `messages`, with one document per message and a unique
//! index on `uuid`. Filters translate directly into `bson::doc!` queries,
//! and assignment transitions use `find_one_and_update` with a filter on
//! the current `assigned_to` value to avoid lost updates — the same
//! conditional-update idiom used by the grounding example
//! (`other_examples/.../jamesreprise-instrumentality` queue route, which
//! uses `find_one_and_update` to atomically claim a queue entry).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::domain::message::{MessageFilter, MessageRecord, Payload};

use super::{AssignOutcome, OrdinalityPolicy, QueueBackend, QueueBackendError, ReleaseOutcome};

/// Document shape stored in MongoDB. Kept distinct from [`MessageRecord`]
/// so BSON (de)serialization details never leak into the domain type.
#[derive(Debug, Serialize, Deserialize)]
struct MessageDoc {
    uuid: String,
    sub_queue: String,
    content_type: String,
    data: serde_json::Value,
    id: Option<i64>,
    assigned_to: Option<String>,
    assignment_timestamp: Option<DateTime<Utc>>,
}

impl From<MessageRecord> for MessageDoc {
    fn from(r: MessageRecord) -> Self {
        Self {
            uuid: r.uuid,
            sub_queue: r.sub_queue,
            content_type: r.payload.content_type,
            data: r.payload.data,
            id: r.id,
            assigned_to: r.assigned_to,
            assignment_timestamp: r.assignment_timestamp,
        }
    }
}

impl From<MessageDoc> for MessageRecord {
    fn from(d: MessageDoc) -> Self {
        MessageRecord {
            uuid: d.uuid,
            sub_queue: d.sub_queue,
            payload: Payload::new(d.content_type, d.data),
            id: d.id,
            assigned_to: d.assigned_to,
            assignment_timestamp: d.assignment_timestamp,
        }
    }
}

pub struct DocumentBackend {
    collection: Collection<MessageDoc>,
}

impl DocumentBackend {
    pub fn new(collection: Collection<MessageDoc>) -> Self {
        Self { collection }
    }
}

fn filter_doc(sub_queue: &str, filter: &MessageFilter) -> Document {
    let mut query = doc! { "sub_queue": sub_queue };
    match filter {
        MessageFilter::All => {}
        MessageFilter::Assigned => {
            query.insert("assigned_to", doc! { "$ne": Bson::Null });
        }
        MessageFilter::Unassigned => {
            query.insert("assigned_to", Bson::Null);
        }
        MessageFilter::AssignedTo(owner) => {
            query.insert("assigned_to", owner);
        }
    }
    query
}

#[async_trait]
impl QueueBackend for DocumentBackend {
    fn ordinality_policy(&self) -> OrdinalityPolicy {
        OrdinalityPolicy::CoreAssigned
    }

    async fn append(&self, record: MessageRecord) -> Result<MessageRecord, QueueBackendError> {
        let doc: MessageDoc = record.into();
        self.collection.insert_one(&doc, None).await?;
        Ok(doc.into())
    }

    async fn remove_by_uuid(&self, uuid: &str) -> Result<usize, QueueBackendError> {
        let result = self
            .collection
            .delete_one(doc! { "uuid": uuid }, None)
            .await?;
        Ok(result.deleted_count as usize)
    }

    async fn update_by_uuid(
        &self,
        uuid: &str,
        record: MessageRecord,
    ) -> Result<bool, QueueBackendError> {
        let update = doc! {
            "$set": {
                "content_type": &record.payload.content_type,
                "data": mongodb::bson::to_bson(&record.payload.data)
                    .map_err(|e| QueueBackendError::Io(e.to_string()))?,
                "assigned_to": record.assigned_to.clone(),
                "assignment_timestamp": record.assignment_timestamp
                    .map(mongodb::bson::DateTime::from_chrono),
            }
        };
        let result = self
            .collection
            .update_one(doc! { "uuid": uuid }, update, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<MessageRecord>, QueueBackendError> {
        let found = self
            .collection
            .find_one(doc! { "uuid": uuid }, None)
            .await?;
        Ok(found.map(Into::into))
    }

    async fn find_sub_queue_of(&self, uuid: &str) -> Result<Option<String>, QueueBackendError> {
        let found = self
            .collection
            .find_one(doc! { "uuid": uuid }, None)
            .await?;
        Ok(found.map(|d| d.sub_queue))
    }

    async fn iterate_sub_queue(
        &self,
        sub_queue: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, QueueBackendError> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
        let mut cursor = self
            .collection
            .find(filter_doc(sub_queue, filter), options)
            .await?;

        let mut out = Vec::new();
        use futures::stream::TryStreamExt;
        while let Some(doc) = cursor.try_next().await? {
            out.push(doc.into());
        }
        Ok(out)
    }

    async fn max_id_of(&self, sub_queue: &str) -> Result<Option<i64>, QueueBackendError> {
        let options = FindOptions::builder()
            .sort(doc! { "id": -1 })
            .limit(1)
            .build();
        let mut cursor = self
            .collection
            .find(doc! { "sub_queue": sub_queue }, options)
            .await?;
        use futures::stream::TryStreamExt;
        Ok(cursor.try_next().await?.and_then(|d| d.id))
    }

    async fn size_of(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let count = self
            .collection
            .count_documents(doc! { "sub_queue": sub_queue }, None)
            .await?;
        Ok(count as usize)
    }

    async fn distinct_sub_queues(&self) -> Result<Vec<String>, QueueBackendError> {
        let values = self
            .collection
            .distinct("sub_queue", None, None)
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn delete_sub_queue(&self, sub_queue: &str) -> Result<usize, QueueBackendError> {
        let result = self
            .collection
            .delete_many(doc! { "sub_queue": sub_queue }, None)
            .await?;
        Ok(result.deleted_count as usize)
    }

    async fn delete_all(&self) -> Result<usize, QueueBackendError> {
        let result = self.collection.delete_many(doc! {}, None).await?;
        Ok(result.deleted_count as usize)
    }

    async fn try_assign(&self, uuid: &str, owner: &str) -> Result<AssignOutcome, QueueBackendError> {
        let filter = doc! {
            "uuid": uuid,
            "$or": [
                { "assigned_to": Bson::Null },
                { "assigned_to": owner },
            ],
        };
        // Pipeline update so a re-assign to the same owner (matched by the
        // `$or` filter above) leaves an existing timestamp untouched instead
        // of refreshing it to now.
        let update = vec![doc! {
            "$set": {
                "assigned_to": owner,
                "assignment_timestamp": {
                    "$cond": {
                        "if": { "$eq": ["$assigned_to", Bson::Null] },
                        "then": "$$NOW",
                        "else": "$assignment_timestamp",
                    }
                },
            }
        }];
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(filter, update, options)
            .await?;

        if let Some(doc) = updated {
            return Ok(AssignOutcome::Assigned(doc.into()));
        }

        match self.find_by_uuid(uuid).await? {
            Some(existing) => Ok(AssignOutcome::AlreadyAssignedTo(
                existing.assigned_to.unwrap_or_default(),
            )),
            None => Ok(AssignOutcome::NotFound),
        }
    }

    async fn try_release(&self, uuid: &str, owner: &str) -> Result<ReleaseOutcome, QueueBackendError> {
        let filter = doc! { "uuid": uuid, "assigned_to": owner };
        let update = doc! {
            "$set": { "assigned_to": Bson::Null, "assignment_timestamp": Bson::Null },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(filter, update, options)
            .await?;

        if let Some(doc) = updated {
            return Ok(ReleaseOutcome::Released(doc.into()));
        }

        match self.find_by_uuid(uuid).await? {
            Some(_) => Ok(ReleaseOutcome::Mismatch),
            None => Ok(ReleaseOutcome::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        self.collection.estimated_document_count(None).await?;
        Ok(())
    }
}
