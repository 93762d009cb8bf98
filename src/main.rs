use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;

use multiqueue_service::auth::TokenProvider;
use multiqueue_service::config::{BackendKind, Settings};
use multiqueue_service::domain::core::MultiQueue;
use multiqueue_service::domain::queue::{create_queue_backend, BackendConnections};
use multiqueue_service::domain::restriction::create_restriction_backend;
use multiqueue_service::server::{create_app, AccessControl, AppState};
use multiqueue_service::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("failed to load configuration")?;
    init_tracing(settings.server.json_logs);
    tracing::info!(backend = ?settings.backend_kind, mode = ?settings.authentication_mode, "configuration loaded");

    let connections = build_backend_connections(&settings).await?;
    let restriction_backend = create_restriction_backend(settings.backend_kind, &connections);
    let queue_backend = create_queue_backend(settings.backend_kind, connections);

    let queue = Arc::new(MultiQueue::new(queue_backend));
    let token_provider = Arc::new(TokenProvider::new(&settings.token));
    let access_control = Arc::new(AccessControl::new(
        settings.authentication_mode,
        token_provider.clone(),
        restriction_backend.clone(),
    ));

    let settings = Arc::new(settings);
    let state = AppState::new(
        settings.clone(),
        queue,
        restriction_backend,
        access_control,
        token_provider,
        settings.backend_kind,
    );
    tracing::info!("application state initialized");

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Build only the connection the configured backend needs, mirroring the
/// teacher's memory-fallback-on-missing-connection convention in
/// `domain::queue::factory::create_queue_backend`.
async fn build_backend_connections(settings: &Settings) -> Result<BackendConnections> {
    let mut connections = BackendConnections::default();

    match settings.backend_kind {
        BackendKind::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.database.pool_size)
                .acquire_timeout(Duration::from_secs(settings.database.connect_timeout_seconds as u64))
                .idle_timeout(Duration::from_secs(settings.database.idle_timeout_seconds as u64))
                .connect(&settings.database.url)
                .await
                .context("failed to connect to the relational backend")?;
            connections.postgres = Some(pool);
        }
        BackendKind::Redis => {
            if settings.redis.sentinel_enabled {
                tracing::warn!(
                    "redis sentinel mode is configured but this build connects directly to \
                     redis.url; sentinel-aware failover is not implemented"
                );
            }
            let client = redis::Client::open(settings.redis.url.as_str())
                .context("invalid redis connection url")?;
            let conn = redis::aio::ConnectionManager::new(client)
                .await
                .context("failed to connect to the cache backend")?;
            connections.redis = Some((conn, settings.redis.prefix.clone()));
        }
        BackendKind::Document => {
            let client = mongodb::Client::with_uri_str(&settings.document.url)
                .await
                .context("failed to connect to the document backend")?;
            let db = client.database(&settings.document.database);
            connections.mongo = Some((db, settings.document.collection.clone()));
        }
        BackendKind::Memory => {}
    }

    Ok(connections)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
