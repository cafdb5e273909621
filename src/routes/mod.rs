//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::console::Console;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(console: Arc<Console>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        // Reads
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/snapshot", get(http::http_get_snapshot))
        .route("/api/v1/hints/sorted", get(http::http_get_sorted))
        .route("/api/v1/reduction", get(http::http_get_reduction))
        .route("/api/v1/candidates/status", get(http::http_get_candidate_status))
        .route("/api/v1/similarity", get(http::http_get_similarity))
        .route("/api/v1/entities", get(http::http_get_entities))
        .route("/api/v1/presets", get(http::http_get_presets))
        .route("/api/v1/questions/suggest", get(http::http_get_suggestions))
        // Long operations
        .route("/api/v1/generate", post(http::http_post_generate))
        .route("/api/v1/evaluate", post(http::http_post_evaluate))
        .route("/api/v1/answer/regenerate", post(http::http_post_answer_regenerate))
        .route("/api/v1/candidates/regenerate", post(http::http_post_candidates_regenerate))
        // Hints
        .route("/api/v1/hints/add", post(http::http_post_hint_add))
        .route("/api/v1/hints/update", post(http::http_post_hint_update))
        .route("/api/v1/hints/delete", post(http::http_post_hint_delete))
        .route("/api/v1/hints/delete_all", post(http::http_post_hint_delete_all))
        .route("/api/v1/hints/reorder", post(http::http_post_hint_reorder))
        .route("/api/v1/hints/reveal", post(http::http_post_hint_reveal))
        .route("/api/v1/hints/sort", post(http::http_post_sort))
        // Candidates
        .route("/api/v1/candidates/add", post(http::http_post_candidate_add))
        .route("/api/v1/candidates/update", post(http::http_post_candidate_update))
        .route("/api/v1/candidates/delete", post(http::http_post_candidate_delete))
        .route("/api/v1/candidates/delete_all", post(http::http_post_candidate_delete_all))
        .route("/api/v1/candidates/ground_truth", post(http::http_post_ground_truth))
        // Session
        .route("/api/v1/answer/update", post(http::http_post_answer_update))
        .route("/api/v1/session/reset", post(http::http_post_reset))
        .route("/api/v1/session/resync", post(http::http_post_resync))
        .route("/api/v1/presets/load", post(http::http_post_preset_load))
        .route("/api/v1/view/step", post(http::http_post_step))
        .route("/api/v1/view/mode", post(http::http_post_mode))
        .route("/api/v1/config/run", post(http::http_post_run_config))
        // State + CORS + HTTP tracing
        .with_state(console)
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
