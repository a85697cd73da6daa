/*
 * Responsibility
 * - /queue 系 handler
 * - QueueStore (in-memory) への読み書き。RwLock は handler 内で短く持つ
 */
use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;

use crate::api::v1::dto::ApiResponse;
use crate::api::v1::dto::queue::{JoinQueueRequest, ManageQueueRequest, UpdateQueueRequest};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::queue::{ManageOutcome, Queue, QueueOperation, QueueOverview};
use crate::state::AppState;

pub async fn overview(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<QueueOverview>>, AppError> {
    let data = state.queues.read().await.overview();

    Ok(Json(ApiResponse::new("queue management service", data)))
}

pub async fn list_all(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Queue>>>, AppError> {
    let data = state.queues.read().await.all();

    Ok(Json(ApiResponse::new("all queues retrieved", data)))
}

pub async fn join(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<JoinQueueRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let receipt = state
        .queues
        .write()
        .await
        .join(&ctx.id, req.queue_id.as_deref())?;

    Ok(Json(ApiResponse::new(
        "successfully joined queue",
        to_value(receipt)?,
    )))
}

pub async fn update_queue(
    State(state): State<AppState>,
    Path(queue_id): Path<String>,
    Json(req): Json<UpdateQueueRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let queue = state
        .queues
        .write()
        .await
        .update(&queue_id, req.name, req.status)?;

    Ok(Json(ApiResponse::new("queue updated", to_value(queue)?)))
}

pub async fn delete_queue(
    State(state): State<AppState>,
    Path(queue_id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let queue = state.queues.write().await.delete(&queue_id)?;

    Ok(Json(ApiResponse::new("queue deleted", to_value(queue)?)))
}

pub async fn manage_queue(
    State(state): State<AppState>,
    Path(queue_id): Path<String>,
    Json(req): Json<ManageQueueRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let operation = QueueOperation::parse(&req.operation);
    let outcome = state.queues.write().await.manage(&queue_id, operation)?;

    let (message, data) = match outcome {
        ManageOutcome::Cleared(queue) => ("queue cleared", to_value(queue)?),
        ManageOutcome::Paused(queue) => ("queue paused", to_value(queue)?),
        ManageOutcome::Resumed(queue) => ("queue resumed", to_value(queue)?),
        ManageOutcome::Next(Some(item)) => ("next in queue processed", to_value(item)?),
        ManageOutcome::Next(None) => ("queue is empty", Value::Null),
        ManageOutcome::Unknown => ("unknown operation", Value::Null),
    };

    Ok(Json(ApiResponse::new(message, data)))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|_| AppError::Internal)
}
