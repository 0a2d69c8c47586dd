//! Unread counter endpoint handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use persistence::PgStore;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

/// Query parameters for the unread counter lookup. Exactly one of
/// `chat_id` and `match_id` must be provided.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnreadQuery {
    pub chat_id: Option<i64>,
    pub match_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UnreadResponse {
    pub count: i64,
}

/// Unread count for one chat, or aggregated across all chats of a match.
///
/// GET /api/v1/unread
pub async fn get_unread_counts(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<UnreadQuery>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let count = match (query.chat_id, query.match_id) {
        (Some(chat_id), None) => state.unread.get_for_chat(actor.user_id, chat_id).await?,
        (None, Some(match_id)) => {
            let mut store = PgStore::begin(&state.pool).await?;
            state
                .unread
                .get_for_match(&mut store, actor.user_id, match_id)
                .await?
        }
        _ => {
            return Err(ApiError::Validation(
                "exactly one of chat_id or match_id is required".to_string(),
            ))
        }
    };

    Ok(Json(UnreadResponse { count }))
}
