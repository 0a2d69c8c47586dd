use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{
    ChatsController, EventPublisher, MessagesController, Presence, TicketsController,
    UnreadCountersController,
};
use persistence::redis::RedisPool;
use persistence::redis::{RedisEventPublisher, RedisPresence, RedisUnreadCounters};

use crate::config::Config;
use crate::routes::{chats, health, messages, tickets, unread};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub chats: ChatsController,
    pub messages: MessagesController,
    pub tickets: TicketsController,
    pub unread: UnreadCountersController,
}

impl AppState {
    /// Wires the process-wide collaborators (unread counters, presence,
    /// publisher) into per-request controllers. The controllers are cheap
    /// clones; the store they operate on is opened per request.
    pub fn new(config: Config, pool: PgPool, redis: RedisPool) -> Self {
        let publisher: Arc<dyn EventPublisher> = Arc::new(RedisEventPublisher::new(redis.clone()));
        let presence: Arc<dyn Presence> = Arc::new(RedisPresence::new(redis.clone()));
        let unread = UnreadCountersController::new(Arc::new(RedisUnreadCounters::new(redis)));

        let chats = ChatsController::new(unread.clone(), presence, publisher.clone());
        let messages = MessagesController::new(unread.clone(), publisher.clone());
        let tickets = TicketsController::new(
            chats.clone(),
            messages.clone(),
            unread.clone(),
            publisher,
        );

        Self {
            pool,
            config: Arc::new(config),
            chats,
            messages,
            tickets,
            unread,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api_routes = Router::new()
        // Chat routes
        .route("/chats", post(chats::create_chat).get(chats::list_chats))
        .route("/chats/:chat_id", get(chats::get_chat))
        .route("/chats/:chat_id/members", post(chats::join_chat))
        .route("/chats/:chat_id/close", post(chats::close_chat))
        .route("/chats/:chat_id/reopen", post(chats::reopen_chat))
        // Message routes
        .route(
            "/chats/:chat_id/messages",
            post(messages::send_message).get(messages::list_messages),
        )
        .route(
            "/chats/:chat_id/messages/:message_id/status",
            post(messages::update_message_status),
        )
        // Ticket routes
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/:ticket_id", get(tickets::get_ticket))
        .route("/tickets/:ticket_id/take", post(tickets::take_into_work))
        .route("/tickets/:ticket_id/close", post(tickets::close_ticket))
        .route("/tickets/:ticket_id/confirm", post(tickets::confirm_ticket))
        .route("/tickets/:ticket_id/reopen", post(tickets::reopen_ticket))
        // Unread counters
        .route("/unread", get(unread::get_unread_counts));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
