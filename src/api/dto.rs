//! Request/response bodies for the REST surface, kept separate
//! from the domain's [`crate::domain::message::MessageRecord`] so the wire
//! shape can diverge from the storage shape.

use serde::{Deserialize, Serialize};

use crate::config::{AuthenticationMode, BackendKind};
use crate::domain::message::Payload;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub uuid: Option<String>,
    pub sub_queue: String,
    pub payload: Payload,
}

/// Metadata update: assignment and/or payload envelope. Either field may
/// be omitted to leave it unchanged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageRequest {
    #[serde(default)]
    pub payload: Option<Payload>,
    /// `Some(None)` would mean "release"; since a plain `Option` can't
    /// distinguish "omitted" from "explicit null", release goes through
    /// `POST /queue/{subQueue}/release` instead and this field only ever
    /// sets an owner.
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerRequest {
    pub owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListQuery {
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub unassigned_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysQuery {
    #[serde(default)]
    pub include_empty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnersQuery {
    pub sub_queue: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct KeysResponse {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OwnersResponse {
    pub owners: std::collections::HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RestrictionListResponse {
    pub restricted: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub backend_ok: bool,
    pub mode: AuthenticationMode,
    pub restriction_store_ok: bool,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub backend_kind: BackendKind,
    pub authentication_mode: AuthenticationMode,
    pub token_default_ttl_seconds: u64,
    pub admin_token_configured: bool,
    pub version: String,
}
