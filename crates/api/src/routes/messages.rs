//! Message endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use validator::Validate;

use domain::models::message::{ListMessagesQuery, SendMessageRequest, UpdateMessageStatusRequest};
use domain::models::Message;
use persistence::PgStore;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

/// Message listing response, newest first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Delivery status acknowledgement response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MessageStatusResponse {
    /// Delivery rows upgraded for the acting user.
    pub updated_for_user: u64,
    /// Total rows upgraded, including the cascade when `update_for_all` is set.
    pub updated_total: u64,
}

/// Post a message to a chat.
///
/// POST /api/v1/chats/:chat_id/messages
pub async fn send_message(
    State(state): State<AppState>,
    actor: Actor,
    Path(chat_id): Path<i64>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    request.validate()?;

    let mut store = PgStore::begin(&state.pool).await?;
    let message = state
        .messages
        .send_message(&mut store, actor.user_id, chat_id, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// List messages in a chat, newest first, clamped to the caller's
/// visibility window.
///
/// GET /api/v1/chats/:chat_id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    actor: Actor,
    Path(chat_id): Path<i64>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let (messages, next_cursor) = state
        .messages
        .list_messages(&mut store, actor.user_id, chat_id, &query)
        .await?;

    Ok(Json(MessageListResponse { messages, next_cursor }))
}

/// Acknowledge delivery or read status for a message.
///
/// POST /api/v1/chats/:chat_id/messages/:message_id/status
pub async fn update_message_status(
    State(state): State<AppState>,
    actor: Actor,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateMessageStatusRequest>,
) -> Result<Json<MessageStatusResponse>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let (updated_for_user, updated_total) = state
        .messages
        .update_message_status(&mut store, actor.user_id, chat_id, message_id, &request)
        .await?;

    Ok(Json(MessageStatusResponse {
        updated_for_user,
        updated_total,
    }))
}
