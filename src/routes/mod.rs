//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
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
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
///
/// Callers identify themselves with `x-user-id` (and optionally `x-user-name`).
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Games
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/games", get(http::http_list_games))
        .route("/api/v1/sessions", post(http::http_start_session))
        .route("/api/v1/sessions/:id", get(http::http_get_session).delete(http::http_end_session))
        .route("/api/v1/sessions/:id/answer", post(http::http_answer))
        .route("/api/v1/sessions/:id/advance", post(http::http_advance))
        .route("/api/v1/sessions/:id/restart", post(http::http_restart))
        .route("/api/v1/sessions/:id/education", post(http::http_toggle_education))
        .route("/api/v1/matching/:id", get(http::http_get_deck).post(http::http_validate_matching))
        .route("/api/v1/simulations/:id", get(http::http_get_simulation).post(http::http_run_simulation))
        .route("/api/v1/progress", get(http::http_get_progress))
        // Classes
        .route("/api/v1/classes", get(http::http_list_classes).post(http::http_create_class))
        .route("/api/v1/classes/:id/delete", post(http::http_soft_delete_class))
        .route("/api/v1/classes/:id/ranking", get(http::http_class_ranking))
        .route("/api/v1/trash", get(http::http_list_trash))
        .route("/api/v1/trash/stats", get(http::http_trash_stats))
        .route("/api/v1/trash/cleanup", post(http::http_cleanup_trash))
        .route("/api/v1/trash/:id/restore", post(http::http_restore_class))
        .route("/api/v1/trash/:id", delete(http::http_force_delete_class))
        .route("/api/v1/invites/:code", get(http::http_get_invite).post(http::http_join_class))
        // Notifications & dates
        .route("/api/v1/notifications", get(http::http_list_notifications))
        .route("/api/v1/notifications/:id", delete(http::http_dismiss_notification))
        .route("/api/v1/dates/inspect", get(http::http_inspect_date))
        // State + CORS + HTTP tracing
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
        // Frontend fallback
        .fallback_service(static_service)
}
