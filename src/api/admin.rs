use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppError;
use crate::server::AppState;

use super::dto::{RestrictionListResponse, TokenResponse};
use super::reserved::check_not_reserved;

/// `POST /auth/{subQueue}` (admin) — issue a token scoped to `subQueue`.
pub async fn issue_token(
    State(state): State<AppState>,
    Path(sub_queue): Path<String>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state.token_provider.issue(&sub_queue, None)?;
    Ok(Json(TokenResponse { token }))
}

/// `PUT /restriction/{subQueue}` (admin) — add a restriction.
pub async fn add_restriction(
    State(state): State<AppState>,
    Path(sub_queue): Path<String>,
) -> Result<Json<RestrictionListResponse>, AppError> {
    check_not_reserved(&state, &sub_queue).await?;
    state.restriction.add(&sub_queue).await?;
    Ok(Json(RestrictionListResponse {
        restricted: state.restriction.list().await?,
    }))
}

/// `DELETE /restriction/{subQueue}` (admin) — remove a restriction.
pub async fn remove_restriction(
    State(state): State<AppState>,
    Path(sub_queue): Path<String>,
) -> Result<Json<RestrictionListResponse>, AppError> {
    state.restriction.remove(&sub_queue).await?;
    Ok(Json(RestrictionListResponse {
        restricted: state.restriction.list().await?,
    }))
}

/// `GET /restriction` — list restricted sub-queues. Not admin-gated: the
/// spec marks only issuance and mutation as administrative.
pub async fn list_restrictions(
    State(state): State<AppState>,
) -> Result<Json<RestrictionListResponse>, AppError> {
    Ok(Json(RestrictionListResponse {
        restricted: state.restriction.list().await?,
    }))
}
