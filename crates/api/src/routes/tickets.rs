//! Ticket endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use validator::Validate;

use domain::models::ticket::{CloseTicketRequest, CreateTicketRequest};
use domain::models::Ticket;
use persistence::PgStore;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

/// Create a ticket, either standalone or escalated from an existing chat.
///
/// POST /api/v1/tickets
pub async fn create_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    request.validate()?;

    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state
        .tickets
        .create_ticket(&mut store, actor.user_id, &request)
        .await?;

    info!(ticket_id = ticket.id, chat_id = ticket.chat_id, "Ticket created via API");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Fetch a single ticket.
///
/// GET /api/v1/tickets/:ticket_id
pub async fn get_ticket(
    State(state): State<AppState>,
    _actor: Actor,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state.tickets.get_ticket(&mut store, ticket_id).await?;
    Ok(Json(ticket))
}

/// Assign the ticket to the acting supervisor and move it to IN_PROGRESS.
///
/// POST /api/v1/tickets/:ticket_id/take
pub async fn take_into_work(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state
        .tickets
        .take_into_work(&mut store, actor.user_id, ticket_id)
        .await?;
    Ok(Json(ticket))
}

/// Mark the ticket as solved.
///
/// POST /api/v1/tickets/:ticket_id/close
pub async fn close_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<i64>,
    Json(request): Json<CloseTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    request.validate()?;

    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state
        .tickets
        .close_ticket(&mut store, actor.user_id, ticket_id, &request)
        .await?;
    Ok(Json(ticket))
}

/// Confirm a solved ticket. Terminal state.
///
/// POST /api/v1/tickets/:ticket_id/confirm
pub async fn confirm_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state
        .tickets
        .confirm_ticket(&mut store, actor.user_id, ticket_id)
        .await?;
    Ok(Json(ticket))
}

/// Send a solved ticket back to IN_PROGRESS.
///
/// POST /api/v1/tickets/:ticket_id/reopen
pub async fn reopen_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>, ApiError> {
    let mut store = PgStore::begin(&state.pool).await?;
    let ticket = state
        .tickets
        .reopen_ticket(&mut store, actor.user_id, ticket_id)
        .await?;
    Ok(Json(ticket))
}
