//! Document store restriction registry: one collection, one document per
//! restricted sub-queue, `sub_queue` as the natural key.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::domain::queue::QueueBackendError;

use super::RestrictionBackend;

#[derive(Debug, Serialize, Deserialize)]
struct RestrictionDoc {
    sub_queue: String,
}

pub struct DocumentRestrictionBackend {
    collection: Collection<RestrictionDoc>,
}

impl DocumentRestrictionBackend {
    pub fn new(collection: Collection<RestrictionDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl RestrictionBackend for DocumentRestrictionBackend {
    async fn is_restricted(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let found = self
            .collection
            .find_one(doc! { "sub_queue": sub_queue }, None)
            .await?;
        Ok(found.is_some())
    }

    async fn add(&self, sub_queue: &str) -> Result<(), QueueBackendError> {
        if self.is_restricted(sub_queue).await? {
            return Ok(());
        }
        self.collection
            .insert_one(
                RestrictionDoc {
                    sub_queue: sub_queue.to_string(),
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        let result = self
            .collection
            .delete_one(doc! { "sub_queue": sub_queue }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn list(&self) -> Result<Vec<String>, QueueBackendError> {
        use futures::stream::TryStreamExt;
        let mut cursor = self.collection.find(doc! {}, None).await?;
        let mut out = Vec::new();
        while let Some(d) = cursor.try_next().await? {
            out.push(d.sub_queue);
        }
        Ok(out)
    }

    async fn clear(&self) -> Result<usize, QueueBackendError> {
        let result = self.collection.delete_many(doc! {}, None).await?;
        Ok(result.deleted_count as usize)
    }

    fn reserved_sub_queues(&self) -> Vec<String> {
        Vec::new()
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        self.collection.estimated_document_count(None).await?;
        Ok(())
    }
}
