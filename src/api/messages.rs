use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::domain::message::MessageRecord;
use crate::error::AppError;
use crate::server::{AppState, RequestContext};

use super::dto::{CreateMessageRequest, RemovedResponse, UpdateMessageRequest};
use super::reserved::check_not_reserved;

pub async fn create_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_not_reserved(&state, &body.sub_queue).await?;
    state.access_control.authorize(&ctx, &body.sub_queue).await?;

    let record = MessageRecord::new(body.uuid, body.sub_queue, body.payload);
    let stored = state.queue.add(record).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(uuid): Path<String>,
) -> Result<Json<MessageRecord>, AppError> {
    let record = state
        .queue
        .get_message_by_uuid(&uuid)
        .await?
        .ok_or(AppError::NotFound)?;
    state.access_control.authorize(&ctx, &record.sub_queue).await?;
    Ok(Json(record))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(uuid): Path<String>,
) -> Result<Json<RemovedResponse>, AppError> {
    let Some(sub_queue) = state.queue.contains_uuid(&uuid).await? else {
        return Ok(Json(RemovedResponse { removed: false }));
    };
    state.access_control.authorize(&ctx, &sub_queue).await?;
    let removed = state.queue.remove(&uuid).await?;
    Ok(Json(RemovedResponse { removed }))
}

pub async fn update_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(uuid): Path<String>,
    Json(body): Json<UpdateMessageRequest>,
) -> Result<Json<MessageRecord>, AppError> {
    let mut record = state
        .queue
        .get_message_by_uuid(&uuid)
        .await?
        .ok_or(AppError::NotFound)?;
    state.access_control.authorize(&ctx, &record.sub_queue).await?;

    if let Some(payload) = body.payload {
        record.payload = payload;
    }
    if let Some(owner) = body.assigned_to {
        return Ok(Json(state.queue.assign(&uuid, &owner).await?));
    }

    let updated = state.queue.persist(record).await?;
    Ok(Json(updated))
}
