// libs/consultation-chat-cell/src/router.rs
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::gateway::attach_room;
use crate::handlers::*;
use crate::state::ChatState;

/// Creates the consultation chat routes, to be nested under `/chat`.
pub fn consultation_chat_routes(state: Arc<ChatState>) -> Router {
    let upload_limit = state.config.chat.max_upload_bytes;

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(chat_health));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}", get(get_room_details))
        .route("/rooms/{room_id}/ws", get(attach_room))
        .route(
            "/rooms/{room_id}/messages",
            post(send_media_message).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/transactions/{transaction_id}/room", get(get_room_by_transaction))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
