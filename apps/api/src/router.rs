use std::sync::Arc;

use axum::{
    http::Request,
    Router,
    routing::get,
};
use tower_http::trace::{self, HttpMakeClassifier, MakeSpan, TraceLayer};
use tracing::{Level, Span};

use consultation_chat_cell::{consultation_chat_routes, ChatState};

pub fn create_router(state: Arc<ChatState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Consultation chat API is running!" }))
        .nest("/chat", consultation_chat_routes(state))
}

/// Request span carrying the path only. WebSocket clients send their JWT in
/// the query string, so the full URI must never reach the access log.
#[derive(Debug, Clone, Copy)]
pub struct PathSpan;

impl<B> MakeSpan<B> for PathSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            version = ?request.version(),
        )
    }
}

pub fn trace_layer() -> TraceLayer<HttpMakeClassifier, PathSpan> {
    TraceLayer::new_for_http()
        .make_span_with(PathSpan)
        .on_response(trace::DefaultOnResponse::new()
            .level(Level::INFO))
}
