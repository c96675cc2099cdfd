//! Router assembly: session API, WebSocket upgrade, relay, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod relay;
pub mod ws;

/// Build the application router with:
/// - Session API under `/api/v1/...`
/// - WebSocket per session at `/api/v1/ws/:id`
/// - Same-origin relay at `/api/relay`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/settings", get(http::http_get_settings))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route("/api/v1/sessions/:id", get(http::http_get_session))
        .route("/api/v1/sessions/:id/configure", post(http::http_configure))
        .route("/api/v1/sessions/:id/start", post(http::http_start))
        .route("/api/v1/sessions/:id/submit", post(http::http_submit))
        .route("/api/v1/sessions/:id/restart", post(http::http_restart))
        .route("/api/v1/sessions/:id/reset", post(http::http_reset))
        .route("/api/v1/sessions/:id/edit", post(http::http_edit))
        .route("/api/v1/sessions/:id/paste", post(http::http_paste))
        .route("/api/v1/sessions/:id/answer", post(http::http_answer))
        .route("/api/v1/sessions/:id/next", post(http::http_next))
        .route("/api/v1/sessions/:id/prev", post(http::http_prev))
        .route("/api/v1/ws/:id", get(ws::ws_upgrade))
        // Method check happens in the handler so the error body stays JSON.
        .route("/api/relay", any(relay::relay))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
