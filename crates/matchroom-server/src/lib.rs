pub mod config;
pub mod routes;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::ServerState;

/// The HTTP surface: the WebSocket gateway plus a health probe.
pub fn app(state: ServerState) -> Router {
    Router::new()
        .route("/gateway", get(routes::ws_upgrade))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
