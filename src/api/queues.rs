use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::domain::message::{MessageFilter, MessageRecord};
use crate::error::AppError;
use crate::server::{AppState, RequestContext};

use super::dto::{
    ClearedResponse, KeysQuery, KeysResponse, OwnerRequest, OwnersQuery, OwnersResponse,
    QueueListQuery,
};

pub async fn list_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Vec<MessageRecord>>, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;

    let filter = if query.unassigned_only {
        MessageFilter::Unassigned
    } else if let Some(owner) = query.assigned_to {
        MessageFilter::AssignedTo(owner)
    } else {
        MessageFilter::All
    };

    Ok(Json(state.queue.get_for_sub_queue(&sub_queue, filter).await?))
}

pub async fn poll_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;
    match state.queue.poll(&sub_queue).await? {
        Some(record) => Ok((StatusCode::OK, Json(Some(record)))),
        None => Ok((StatusCode::NO_CONTENT, Json(None))),
    }
}

pub async fn peek_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;
    match state.queue.peek(&sub_queue).await? {
        Some(record) => Ok((StatusCode::OK, Json(Some(record)))),
        None => Ok((StatusCode::NO_CONTENT, Json(None))),
    }
}

pub async fn clear_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
) -> Result<Json<ClearedResponse>, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;
    let cleared = state.queue.clear_for(&sub_queue).await?;
    Ok(Json(ClearedResponse { cleared }))
}

pub async fn assign_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
    Json(body): Json<OwnerRequest>,
) -> Result<Json<MessageRecord>, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;
    let head = state
        .queue
        .peek(&sub_queue)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.queue.assign(&head.uuid, &body.owner).await?))
}

pub async fn release_queue(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(sub_queue): Path<String>,
    Json(body): Json<OwnerRequest>,
) -> Result<Json<MessageRecord>, AppError> {
    state.access_control.authorize(&ctx, &sub_queue).await?;
    // The lowest-id assigned message in this sub-queue, regardless of
    // current owner: `release` itself is what validates `body.owner`
    // against it, surfacing `AssignmentMismatch` rather than `NotFound`
    // when another owner holds it.
    let assigned = state
        .queue
        .get_for_sub_queue(&sub_queue, MessageFilter::Assigned)
        .await?;
    let record = assigned.into_iter().next().ok_or(AppError::NotFound)?;
    Ok(Json(state.queue.release(&record.uuid, &body.owner).await?))
}

pub async fn keys(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> Result<Json<KeysResponse>, AppError> {
    let mut keys: Vec<String> = state.queue.keys(query.include_empty).await?.into_iter().collect();
    keys.sort();
    Ok(Json(KeysResponse { keys }))
}

pub async fn owners(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<OwnersQuery>,
) -> Result<Json<OwnersResponse>, AppError> {
    if let Some(sub_queue) = &query.sub_queue {
        state.access_control.authorize(&ctx, sub_queue).await?;
    }
    let map = state.queue.owners_map(query.sub_queue.as_deref()).await?;
    let owners = map
        .into_iter()
        .map(|(owner, sub_queues)| (owner, sub_queues.into_iter().collect()))
        .collect();
    Ok(Json(OwnersResponse { owners }))
}
