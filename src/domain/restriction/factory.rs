//! Restriction backend factory, mirroring
//! [`crate::domain::queue::create_queue_backend`]'s connection-based
//! selection and memory fallback.

use std::sync::Arc;

use crate::config::BackendKind;
use crate::domain::queue::factory::BackendConnections;

use super::{
    DocumentRestrictionBackend, MemoryRestrictionBackend, PostgresRestrictionBackend,
    RedisRestrictionBackend, RestrictionBackend,
};

pub fn create_restriction_backend(
    kind: BackendKind,
    connections: &BackendConnections,
) -> Arc<dyn RestrictionBackend> {
    match kind {
        BackendKind::Postgres => {
            if let Some(pool) = &connections.postgres {
                tracing::info!(backend = "postgres", "creating relational restriction backend");
                Arc::new(PostgresRestrictionBackend::new(pool.clone()))
            } else {
                tracing::warn!(
                    "postgres restriction backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryRestrictionBackend::new())
            }
        }
        BackendKind::Redis => {
            if let Some((conn, prefix)) = &connections.redis {
                tracing::info!(backend = "redis", "creating cache restriction backend");
                Arc::new(RedisRestrictionBackend::new(conn.clone(), prefix.clone()))
            } else {
                tracing::warn!(
                    "redis restriction backend requested but no connection provided, falling back to memory"
                );
                Arc::new(MemoryRestrictionBackend::new())
            }
        }
        BackendKind::Document => {
            if let Some((db, _collection_name)) = &connections.mongo {
                tracing::info!(backend = "document", "creating document restriction backend");
                Arc::new(DocumentRestrictionBackend::new(db.collection("restrictions")))
            } else {
                tracing::warn!(
                    "document restriction backend requested but no database handle provided, falling back to memory"
                );
                Arc::new(MemoryRestrictionBackend::new())
            }
        }
        BackendKind::Memory => {
            tracing::info!(backend = "memory", "creating in-memory restriction backend");
            Arc::new(MemoryRestrictionBackend::new())
        }
    }
}
