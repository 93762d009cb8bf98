use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::error::AppError;
use crate::server::AppState;

use super::dto::{HealthResponse, SettingsResponse};

/// `GET /health`: the core's `healthCheck` plus a restriction store probe,
/// reported as a composite status rather than failing the request outright
/// so monitoring can distinguish "down" from "degraded".
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend_ok = state.queue.health_check().await.is_ok();
    let restriction_store_ok = state.restriction.ping().await.is_ok();

    Json(HealthResponse {
        ok: backend_ok && restriction_store_ok,
        backend_ok,
        mode: state.access_control.mode(),
        restriction_store_ok,
        uptime_seconds: state.uptime_seconds(),
    })
}

/// `GET /settings`: effective, non-secret configuration.
pub async fn settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        backend_kind: state.backend_kind,
        authentication_mode: state.access_control.mode(),
        token_default_ttl_seconds: state.settings.token.default_ttl_seconds,
        admin_token_configured: state.settings.admin_token.is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /metrics` — Prometheus text exposition of process counters.
pub async fn metrics() -> Result<impl IntoResponse, AppError> {
    let body = crate::metrics::encode_metrics()
        .map_err(|e| AppError::Internal(format!("failed to encode metrics: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
