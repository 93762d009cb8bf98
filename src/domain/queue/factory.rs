//! Queue backend factory: selects among the four [`super::QueueBackend`]
//! implementations by configuration, falling back to memory with a warning
//! when the requested pool isn't available.

use std::sync::Arc;

use mongodb::Database;
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use crate::config::BackendKind;

use super::{DocumentBackend, MemoryBackend, PostgresBackend, QueueBackend, RedisBackend};

/// Connections the caller may already hold open; only the one matching
/// `kind` is required, the rest are ignored.
#[derive(Default)]
pub struct BackendConnections {
    pub postgres: Option<PgPool>,
    pub redis: Option<(ConnectionManager, String)>,
    pub mongo: Option<(Database, String)>,
}

/// Build the queue backend selected by configuration.
///
/// Falls back to [`MemoryBackend`] with a warning if the configured backend
/// has no matching connection in `connections`, rather than failing
/// startup outright on a misconfigured deployment.
pub fn create_queue_backend(
    kind: BackendKind,
    connections: BackendConnections,
) -> Arc<dyn QueueBackend> {
    match kind {
        BackendKind::Postgres => {
            if let Some(pool) = connections.postgres {
                tracing::info!(backend = "postgres", "creating relational queue backend");
                Arc::new(PostgresBackend::new(pool))
            } else {
                tracing::warn!(
                    "postgres backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryBackend::new())
            }
        }
        BackendKind::Redis => {
            if let Some((conn, prefix)) = connections.redis {
                tracing::info!(backend = "redis", prefix = %prefix, "creating cache queue backend");
                Arc::new(RedisBackend::new(conn, prefix))
            } else {
                tracing::warn!(
                    "redis backend requested but no connection provided, falling back to memory"
                );
                Arc::new(MemoryBackend::new())
            }
        }
        BackendKind::Document => {
            if let Some((db, collection_name)) = connections.mongo {
                tracing::info!(backend = "document", collection = %collection_name, "creating document queue backend");
                Arc::new(DocumentBackend::new(db.collection(&collection_name)))
            } else {
                tracing::warn!(
                    "document backend requested but no database handle provided, falling back to memory"
                );
                Arc::new(MemoryBackend::new())
            }
        }
        BackendKind::Memory => {
            tracing::info!(backend = "memory", "creating in-memory queue backend");
            Arc::new(MemoryBackend::new())
        }
    }
}
