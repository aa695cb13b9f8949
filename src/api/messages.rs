use crate::api::AppState;
use crate::api::schemas::messaging::{HistoryQuery, MessageView, SendMessage, SendMessageResponse};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Records an outbound message and dispatches it through the provider.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is malformed or fails validation.
/// Returns `AppError::Delivery` if the provider did not accept the message.
pub async fn send_message(
    State(state): State<AppState>,
    body: std::result::Result<Json<SendMessage>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let message = state.message_service.send(body.into()).await?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse::from(&message))))
}

/// Lists the messages of a conversation, newest first.
///
/// # Errors
/// Returns `AppError::BadRequest` if `conversationId` is missing or `limit` is not a number.
pub async fn list_messages(
    State(state): State<AppState>,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageView>>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let messages = state.message_service.history(&query.conversation_id, query.limit).await?;

    Ok(Json(messages.into_iter().map(MessageView::from).collect()))
}

/// # Errors
/// Returns `AppError::NotFound` if the message does not exist.
pub async fn get_message(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MessageView>> {
    Ok(Json(state.message_service.get(id).await?.into()))
}

/// # Errors
/// Returns `AppError::NotFound` for an unknown message and `AppError::Conflict` if it
/// cannot be marked read from its current state.
pub async fn mark_read(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MessageView>> {
    Ok(Json(state.message_service.mark_read(id).await?.into()))
}

/// Pulls the current delivery status from the provider.
///
/// # Errors
/// Returns `AppError::NotFound` for an unknown message and `AppError::Delivery` if the
/// provider could not be reached.
pub async fn refresh_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MessageView>> {
    Ok(Json(state.message_service.refresh_status(id).await?.into()))
}
