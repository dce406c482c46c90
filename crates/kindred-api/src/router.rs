use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::resolve_device;
use crate::state::AppState;
use crate::{abuse, circles, device, letters, messages, reactions, realtime, typing};

pub fn build_router(state: AppState) -> Router {
    let device_routes = Router::new()
        .route("/circles/join", post(circles::join_circle))
        .route("/circles/leave", post(circles::leave_circle))
        .route("/circles/current", get(circles::current_circle))
        .route("/circles/{circle_id}/messages", get(messages::get_messages).post(messages::send_message))
        .route("/circles/{circle_id}/typing", post(typing::typing))
        .route("/messages/{message_id}/reactions", post(reactions::react))
        .route("/reports", post(abuse::post_report))
        .route("/blocks", post(abuse::post_block))
        .route("/stream", get(realtime::stream))
        .route("/letters", post(letters::post_letter))
        .route("/letters/random", get(letters::random_letter))
        .route("/letters/{letter_id}/responses", get(letters::letter_responses))
        .route("/responses", post(letters::post_response))
        .route("/device", delete(device::reset_device))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_device))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(device_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
