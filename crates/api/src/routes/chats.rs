//! Chat endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use domain::models::chat::{ChatDetail, ChatSummary, CreateChatRequest, JoinChatRequest, ListChatsQuery};
use domain::models::Chat;
use domain::storage::MessengerStore;
use persistence::PgStore;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

/// Chat listing response with the opaque cursor for the next page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Membership join response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct JoinChatResponse {
    /// False when the user was already a member (the join is idempotent).
    pub added: bool,
}

/// Create a new chat.
///
/// POST /api/v1/chats
pub async fn create_chat(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    request.validate()?;

    let mut store = PgStore::begin(&state.pool).await?;
    let chat = state
        .chats
        .create_chat(
            &mut store,
            Some(actor.user_id),
            request.chat_type,
            request.match_id,
            request.meta,
        )
        .await?;

    info!(chat_id = chat.id, "Chat created via API");
    Ok((StatusCode::CREATED, Json(chat)))
}

/// List chats visible to the acting user.
///
/// GET /api/v1/chats
pub async fn list_chats(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<ChatListResponse>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let (chats, next_cursor) = state
        .chats
        .list_chats(&mut store, actor.user_id, actor.role, &query)
        .await?;

    Ok(Json(ChatListResponse { chats, next_cursor }))
}

/// Chat detail with members, presence flags and the unread count.
///
/// GET /api/v1/chats/:chat_id
pub async fn get_chat(
    State(state): State<AppState>,
    actor: Actor,
    Path(chat_id): Path<i64>,
) -> Result<Json<ChatDetail>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let detail = state
        .chats
        .get_chat_details(&mut store, actor.user_id, actor.role, chat_id)
        .await?;

    Ok(Json(detail))
}

/// Add a user to a chat. Idempotent: joining twice reports `added: false`.
///
/// POST /api/v1/chats/:chat_id/members
pub async fn join_chat(
    State(state): State<AppState>,
    _actor: Actor,
    Path(chat_id): Path<i64>,
    Json(request): Json<JoinChatRequest>,
) -> Result<Json<JoinChatResponse>, ApiError> {
    request.validate()?;

    let mut store = PgStore::begin(&state.pool).await?;
    let user = store
        .get_user(request.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", request.user_id)))?;

    let added = state
        .chats
        .add_user_to_chat(
            &mut store,
            user.id,
            chat_id,
            user.role,
            request.is_primary_member,
            request.has_read_permission,
            request.has_write_permission,
        )
        .await?;

    Ok(Json(JoinChatResponse { added }))
}

/// Close a chat.
///
/// POST /api/v1/chats/:chat_id/close
pub async fn close_chat(
    State(state): State<AppState>,
    _actor: Actor,
    Path(chat_id): Path<i64>,
) -> Result<Json<Chat>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let chat = state.chats.close_chat(&mut store, chat_id).await?;
    Ok(Json(chat))
}

/// Reopen a closed chat.
///
/// POST /api/v1/chats/:chat_id/reopen
pub async fn reopen_chat(
    State(state): State<AppState>,
    _actor: Actor,
    Path(chat_id): Path<i64>,
) -> Result<Json<Chat>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let chat = state.chats.reopen_chat(&mut store, chat_id).await?;
    Ok(Json(chat))
}
