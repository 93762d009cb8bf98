//! In-memory restriction registry, backed by the same generic named-set
//! helper the in-memory queue backend uses for its own bookkeeping.

use async_trait::async_trait;

use crate::domain::queue::{InMemorySet, QueueBackendError};

use super::RestrictionBackend;

#[derive(Default)]
pub struct MemoryRestrictionBackend {
    restricted: InMemorySet,
}

impl MemoryRestrictionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RestrictionBackend for MemoryRestrictionBackend {
    async fn is_restricted(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        Ok(self.restricted.contains(sub_queue).await)
    }

    async fn add(&self, sub_queue: &str) -> Result<(), QueueBackendError> {
        self.restricted.insert(sub_queue.to_string()).await;
        Ok(())
    }

    async fn remove(&self, sub_queue: &str) -> Result<bool, QueueBackendError> {
        Ok(self.restricted.remove(sub_queue).await)
    }

    async fn list(&self) -> Result<Vec<String>, QueueBackendError> {
        Ok(self.restricted.list().await)
    }

    async fn clear(&self) -> Result<usize, QueueBackendError> {
        Ok(self.restricted.clear().await)
    }

    fn reserved_sub_queues(&self) -> Vec<String> {
        Vec::new()
    }

    async fn ping(&self) -> Result<(), QueueBackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_remove_and_list_round_trip() {
        let backend = MemoryRestrictionBackend::new();
        assert!(!backend.is_restricted("secure").await.unwrap());

        backend.add("secure").await.unwrap();
        assert!(backend.is_restricted("secure").await.unwrap());
        assert_eq!(backend.list().await.unwrap(), vec!["secure".to_string()]);

        assert!(backend.remove("secure").await.unwrap());
        assert!(!backend.remove("secure").await.unwrap());
        assert!(!backend.is_restricted("secure").await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_everything_and_reports_count() {
        let backend = MemoryRestrictionBackend::new();
        backend.add("a").await.unwrap();
        backend.add("b").await.unwrap();

        assert_eq!(backend.clear().await.unwrap(), 2);
        assert!(backend.list().await.unwrap().is_empty());
    }
}
